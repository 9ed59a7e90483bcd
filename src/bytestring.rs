//! Reference-counted byte strings that can alias a substring of another
//! string without copying.
//!
//! A [`ByteString`] is backed by exactly one of:
//! - an owned heap buffer,
//! - a `(start, len)` window into a parent string, holding a reference on it,
//! - a `&'static [u8]` that is never refcounted.
//!
//! Cloning takes a reference; dropping releases it. A string is mutable only
//! while it is uniquely owned. [`ByteString::recycle`] resets a uniquely
//! owned string in place and otherwise swaps in a fresh one, which is how the
//! decoder reuses its scratch buffers across fields.

use prost::bytes::Bytes;
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    ops::Deref,
    rc::Rc,
    str::Utf8Error,
};

#[derive(Clone)]
pub struct ByteString(Repr);

#[derive(Clone)]
enum Repr {
    Static(&'static [u8]),
    Counted(Rc<Storage>),
}

enum Storage {
    Heap(Vec<u8>),
    /// `parent` is always heap-backed; substrings of substrings are flattened.
    Substr {
        parent: ByteString,
        start: usize,
        len: usize,
    },
}

impl Storage {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Storage::Heap(buf) => buf,
            Storage::Substr { parent, start, len } => &parent.as_bytes()[*start..*start + *len],
        }
    }
}

impl ByteString {
    /// Returns an empty string with a reference count of one and no buffer.
    pub fn new() -> Self {
        Self(Repr::Counted(Rc::new(Storage::Heap(Vec::new()))))
    }

    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self(Repr::Static(bytes))
    }

    pub fn from_vec(buf: Vec<u8>) -> Self {
        Self(Repr::Counted(Rc::new(Storage::Heap(buf))))
    }

    pub fn copy_from_slice(bytes: &[u8]) -> Self {
        Self::from_vec(bytes.to_vec())
    }

    /// Returns a new string viewing `self[offset..offset + len]`.
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        let mut out = Self::new();
        out.substr(self, offset, len);
        out
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.0 {
            Repr::Static(bytes) => bytes,
            Repr::Counted(storage) => storage.as_bytes(),
        }
    }

    pub fn as_str(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(self.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live references, or `None` for static strings.
    pub fn ref_count(&self) -> Option<usize> {
        match &self.0 {
            Repr::Static(_) => None,
            Repr::Counted(storage) => Some(Rc::strong_count(storage)),
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self.0, Repr::Static(_))
    }

    /// Whether this string is a view into another string's buffer.
    pub fn has_parent(&self) -> bool {
        self.parent().is_some()
    }

    pub fn parent(&self) -> Option<&ByteString> {
        match &self.0 {
            Repr::Counted(storage) => match &**storage {
                Storage::Substr { parent, .. } => Some(parent),
                Storage::Heap(_) => None,
            },
            Repr::Static(_) => None,
        }
    }

    /// Whether the bytes live in a heap buffer owned by this string.
    pub fn owns_buffer(&self) -> bool {
        match &self.0 {
            Repr::Counted(storage) => matches!(**storage, Storage::Heap(_)),
            Repr::Static(_) => false,
        }
    }

    /// Makes `slot` an empty, uniquely owned string.
    ///
    /// A uniquely owned string is cleared in place and keeps its allocation;
    /// a shared one is replaced, leaving the other owners untouched.
    pub fn recycle(slot: &mut ByteString) {
        if let Repr::Counted(storage) = &mut slot.0 {
            if let Some(storage) = Rc::get_mut(storage) {
                match storage {
                    Storage::Heap(buf) => buf.clear(),
                    other => *other = Storage::Heap(Vec::new()),
                }
                return;
            }
        }
        *slot = ByteString::new();
    }

    /// Resizes the string to exactly `len` bytes and returns them for writing.
    ///
    /// # Panics
    ///
    /// Panics if the string is shared, static, or a substring.
    pub fn fill(&mut self, len: usize) -> &mut [u8] {
        match self.heap_mut() {
            Some(buf) => {
                buf.clear();
                buf.resize(len, 0);
                &mut buf[..]
            }
            None => panic!("ByteString::fill on a shared, static or aliased string"),
        }
    }

    /// Appends `bytes`, detaching into a private copy first if the string is
    /// shared, static, or a substring.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        if let Some(buf) = self.heap_mut() {
            buf.extend_from_slice(bytes);
            return;
        }
        let mut buf = Vec::with_capacity(self.len() + bytes.len());
        buf.extend_from_slice(self.as_bytes());
        buf.extend_from_slice(bytes);
        *self = Self::from_vec(buf);
    }

    /// Makes `self` a view of `parent[offset..offset + len]`, taking a
    /// reference on `parent`.
    ///
    /// # Panics
    ///
    /// Panics unless `self` is freshly created or recycled, or if the range is
    /// outside `parent`.
    pub fn substr(&mut self, parent: &ByteString, offset: usize, len: usize) {
        assert!(
            self.heap_mut().is_some_and(|buf| buf.is_empty()),
            "ByteString::substr target must be new or recycled"
        );
        let end = offset.checked_add(len);
        assert!(
            end.is_some_and(|end| end <= parent.len()),
            "ByteString::substr range {offset}+{len} outside parent of length {}",
            parent.len()
        );

        let storage = match &parent.0 {
            Repr::Static(bytes) => {
                self.0 = Repr::Static(&bytes[offset..offset + len]);
                return;
            }
            Repr::Counted(storage) => match &**storage {
                Storage::Heap(_) => Storage::Substr {
                    parent: parent.clone(),
                    start: offset,
                    len,
                },
                Storage::Substr {
                    parent: root,
                    start,
                    ..
                } => Storage::Substr {
                    parent: root.clone(),
                    start: start + offset,
                    len,
                },
            },
        };

        if let Repr::Counted(slot) = &mut self.0 {
            if let Some(slot) = Rc::get_mut(slot) {
                *slot = storage;
                return;
            }
        }
        self.0 = Repr::Counted(Rc::new(storage));
    }

    /// Returns an independent, uniquely owned copy.
    pub fn duplicate(&self) -> Self {
        Self::copy_from_slice(self.as_bytes())
    }

    /// Converts into an atomically refcounted buffer that may cross threads.
    ///
    /// Static strings are converted without copying.
    pub fn to_bytes(&self) -> Bytes {
        match &self.0 {
            Repr::Static(bytes) => Bytes::from_static(bytes),
            Repr::Counted(_) => Bytes::copy_from_slice(self.as_bytes()),
        }
    }

    fn heap_mut(&mut self) -> Option<&mut Vec<u8>> {
        match &mut self.0 {
            Repr::Counted(storage) => match Rc::get_mut(storage)? {
                Storage::Heap(buf) => Some(buf),
                Storage::Substr { .. } => None,
            },
            Repr::Static(_) => None,
        }
    }
}

impl Default for ByteString {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for ByteString {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for ByteString {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl PartialEq for ByteString {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for ByteString {}

impl PartialEq<[u8]> for ByteString {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<&[u8]> for ByteString {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_bytes() == *other
    }
}

impl<const N: usize> PartialEq<[u8; N]> for ByteString {
    fn eq(&self, other: &[u8; N]) -> bool {
        self.as_bytes() == other.as_slice()
    }
}

impl<const N: usize> PartialEq<&[u8; N]> for ByteString {
    fn eq(&self, other: &&[u8; N]) -> bool {
        self.as_bytes() == other.as_slice()
    }
}

impl PartialOrd for ByteString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByteString {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl Hash for ByteString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state)
    }
}

impl fmt::Debug for ByteString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b\"{}\"", self.as_bytes().escape_ascii())
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(buf: Vec<u8>) -> Self {
        Self::from_vec(buf)
    }
}

impl From<String> for ByteString {
    fn from(s: String) -> Self {
        Self::from_vec(s.into_bytes())
    }
}

impl From<&'static [u8]> for ByteString {
    fn from(bytes: &'static [u8]) -> Self {
        Self::from_static(bytes)
    }
}

impl<const N: usize> From<&'static [u8; N]> for ByteString {
    fn from(bytes: &'static [u8; N]) -> Self {
        Self::from_static(bytes)
    }
}

impl From<&'static str> for ByteString {
    fn from(s: &'static str) -> Self {
        Self::from_static(s.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_empty_and_unshared() {
        let s = ByteString::new();
        assert!(s.is_empty());
        assert_eq!(s.ref_count(), Some(1));
        assert!(s.owns_buffer());
        assert!(!s.has_parent());
    }

    #[test]
    fn clone_takes_a_reference() {
        let a = ByteString::copy_from_slice(b"abc");
        let b = a.clone();
        assert_eq!(a.ref_count(), Some(2));
        drop(b);
        assert_eq!(a.ref_count(), Some(1));
    }

    #[test]
    fn substring_keeps_parent_alive() {
        let parent = ByteString::from_vec(b"hello world".to_vec());
        let sub = parent.slice(6, 5);
        assert_eq!(parent.ref_count(), Some(2));
        assert!(sub.has_parent());
        assert!(!sub.owns_buffer());

        drop(parent);
        assert_eq!(sub, b"world");
        assert_eq!(sub.parent().and_then(|p| p.ref_count()), Some(1));
    }

    #[test]
    fn dropping_substring_releases_parent() {
        let parent = ByteString::from_vec(b"hello".to_vec());
        let sub = parent.slice(1, 3);
        assert_eq!(parent.ref_count(), Some(2));
        drop(sub);
        assert_eq!(parent.ref_count(), Some(1));
    }

    #[test]
    fn nested_substrings_point_at_the_root() {
        let root = ByteString::from_vec(b"0123456789".to_vec());
        let mid = root.slice(2, 6);
        let inner = mid.slice(1, 3);
        assert_eq!(inner, b"345");
        assert_eq!(root.ref_count(), Some(3));
        assert_eq!(mid.ref_count(), Some(1));
    }

    #[test]
    fn substring_of_static_stays_static() {
        let s = ByteString::from_static(b"static bytes");
        let sub = s.slice(7, 5);
        assert!(sub.is_static());
        assert_eq!(sub.ref_count(), None);
        assert_eq!(sub, b"bytes");
    }

    #[test]
    fn recycle_unique_string_keeps_allocation() {
        let mut s = ByteString::new();
        s.fill(32).copy_from_slice(&[7; 32]);
        ByteString::recycle(&mut s);
        assert!(s.is_empty());
        assert_eq!(s.ref_count(), Some(1));
    }

    #[test]
    fn recycle_shared_string_detaches() {
        let mut s = ByteString::copy_from_slice(b"payload");
        let kept = s.clone();
        ByteString::recycle(&mut s);
        assert!(s.is_empty());
        assert_eq!(s.ref_count(), Some(1));
        assert_eq!(kept, b"payload");
        assert_eq!(kept.ref_count(), Some(1));
    }

    #[test]
    fn recycle_substring_drops_parent_reference() {
        let parent = ByteString::copy_from_slice(b"abcdef");
        let mut sub = parent.slice(0, 3);
        ByteString::recycle(&mut sub);
        assert_eq!(parent.ref_count(), Some(1));
        sub.substr(&parent, 3, 3);
        assert_eq!(sub, b"def");
    }

    #[test]
    #[should_panic]
    fn fill_on_shared_string_panics() {
        let mut s = ByteString::new();
        let _other = s.clone();
        s.fill(4);
    }

    #[test]
    #[should_panic]
    fn substr_out_of_range_panics() {
        let parent = ByteString::copy_from_slice(b"abc");
        parent.slice(2, 2);
    }

    #[test]
    fn extend_detaches_from_parent() {
        let parent = ByteString::copy_from_slice(b"abc");
        let mut sub = parent.slice(1, 2);
        sub.extend_from_slice(b"xy");
        assert_eq!(sub, b"bcxy");
        assert!(sub.owns_buffer());
        assert_eq!(parent.ref_count(), Some(1));
    }

    #[test]
    fn value_semantics() {
        let a = ByteString::from("abc");
        let b = ByteString::copy_from_slice(b"abd");
        assert!(a < b);
        assert_eq!(a, a.duplicate());
        assert_eq!(a.duplicate().ref_count(), Some(1));
        assert_eq!(format!("{:?}", ByteString::from("a\n")), "b\"a\\n\"");
        assert_eq!(a.to_bytes(), Bytes::from_static(b"abc"));
    }
}
