/// Result of resolving a cached value.
///
/// `Nonexistent` is a confirmed negative answer and is cached like a value;
/// "not cached" is expressed by the absence of an entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry<V> {
    Present(V),
    Nonexistent,
}

impl<V> Entry<V> {
    pub fn exists(&self) -> bool {
        matches!(self, Entry::Present(_))
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            Entry::Present(value) => Some(value),
            Entry::Nonexistent => None,
        }
    }

    pub fn into_value(self) -> Option<V> {
        match self {
            Entry::Present(value) => Some(value),
            Entry::Nonexistent => None,
        }
    }

    pub fn map<W>(self, f: impl FnOnce(V) -> W) -> Entry<W> {
        match self {
            Entry::Present(value) => Entry::Present(f(value)),
            Entry::Nonexistent => Entry::Nonexistent,
        }
    }
}

impl<V> From<Option<V>> for Entry<V> {
    fn from(value: Option<V>) -> Self {
        match value {
            Some(value) => Entry::Present(value),
            None => Entry::Nonexistent,
        }
    }
}
