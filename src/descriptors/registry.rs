use super::{
    bootstrap, builder::RegistryBuilder, DefId, EnumDescriptor, EnumId, MessageDescriptor,
    MessageId, RegistryResult,
};
use crate::{bytestring::ByteString, Str};
use rustc_hash::FxHashMap;

/// A finalized, immutable set of message and enum definitions.
///
/// Every type link inside the registry resolves to a definition in the same
/// registry. Registries are `Send + Sync` and may be shared between decoders.
#[derive(Debug, Default)]
pub struct Registry {
    pub(crate) messages: Vec<MessageDescriptor>,
    pub(crate) enums: Vec<EnumDescriptor>,
    pub(crate) symbols: FxHashMap<Str, DefId>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Builds a registry from a serialized `FileDescriptorSet`.
    pub fn from_file_descriptor_set(bytes: impl Into<ByteString>) -> RegistryResult<Self> {
        let mut builder = RegistryBuilder::new();
        builder.add_file_descriptor_set(bytes)?;
        builder.finalize()
    }

    /// The registry describing `google/protobuf/descriptor.proto`, as far as
    /// it is needed to read descriptor sets.
    pub fn descriptor_proto() -> &'static Registry {
        bootstrap::descriptor_registry()
    }

    /// Looks a definition up by fully-qualified name. A leading `.` is allowed.
    pub fn lookup(&self, name: &str) -> Option<DefId> {
        let name = name.strip_prefix('.').unwrap_or(name);
        self.symbols.get(name).copied()
    }

    pub fn lookup_message(&self, name: &str) -> Option<&MessageDescriptor> {
        match self.lookup(name)? {
            DefId::Message(id) => Some(self.message(id)),
            DefId::Enum(_) => None,
        }
    }

    pub fn lookup_enum(&self, name: &str) -> Option<&EnumDescriptor> {
        match self.lookup(name)? {
            DefId::Enum(id) => Some(self.enum_type(id)),
            DefId::Message(_) => None,
        }
    }

    /// Resolves `symbol` the way a `.proto` file would from inside `base`:
    /// enclosing scopes are searched innermost first, and a leading `.` makes
    /// the name absolute.
    pub fn resolve(&self, base: &str, symbol: &str) -> Option<DefId> {
        resolve_symbol(&self.symbols, base, symbol)
    }

    /// # Panics
    ///
    /// Panics if `id` belongs to a different registry.
    pub fn message(&self, id: MessageId) -> &MessageDescriptor {
        &self.messages[id.index()]
    }

    /// # Panics
    ///
    /// Panics if `id` belongs to a different registry.
    pub fn enum_type(&self, id: EnumId) -> &EnumDescriptor {
        &self.enums[id.index()]
    }

    pub fn messages(&self) -> impl Iterator<Item = &MessageDescriptor> + '_ {
        self.messages.iter()
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumDescriptor> + '_ {
        self.enums.iter()
    }

    /// Number of definitions of either kind.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

pub(crate) fn resolve_symbol(
    symbols: &FxHashMap<Str, DefId>,
    base: &str,
    symbol: &str,
) -> Option<DefId> {
    if symbol.is_empty() {
        return None;
    }
    if let Some(absolute) = symbol.strip_prefix('.') {
        return symbols.get(absolute).copied();
    }
    let mut scope = base;
    let mut candidate = String::with_capacity(base.len() + symbol.len() + 1);
    loop {
        candidate.clear();
        if !scope.is_empty() {
            candidate.push_str(scope);
            candidate.push('.');
        }
        candidate.push_str(symbol);
        if let Some(def) = symbols.get(candidate.as_str()) {
            return Some(*def);
        }
        if scope.is_empty() {
            return None;
        }
        scope = scope.rsplit_once('.').map_or("", |(outer, _)| outer);
    }
}
