use std::{fmt, rc::Rc};

const BUCKETS: usize = 100;

/// Storage assigned to a variable: the name of a global cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Designator(Rc<str>);

impl Designator {
    /// The slot every value-returning call stores its result in.
    pub fn return_slot() -> Self {
        Self("res".into())
    }

    pub fn qualified(function: &str, name: &str) -> Self {
        Self(format!("{function}_{name}").into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Designator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn bucket_of(name: &str) -> usize {
    let hash = name.bytes().fold(2739i32, |hash, b| hash.wrapping_mul(33).wrapping_add(b as i32));
    hash.unsigned_abs() as usize % BUCKETS
}

#[derive(Debug, Clone)]
struct Entry {
    name: Box<str>,
    designator: Designator,
}

/// Variables visible in one scope of one function.
///
/// Cloning is O(1): the bucket array is shared until one of the copies is
/// written to, at which point only that copy pays for the duplication. A body
/// compiled in a clone can never leak declarations into its parent.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    function: Rc<str>,
    buckets: Rc<Vec<Vec<Entry>>>,
    len: usize,
}

impl SymbolTable {
    pub fn new(function: &str) -> Self {
        Self { function: function.into(), buckets: Rc::new(vec![Vec::new(); BUCKETS]), len: 0 }
    }

    /// Binds `name` to a fresh designator. Returns `None` if `name` is already
    /// bound here, leaving the existing binding untouched.
    pub fn insert(&mut self, name: &str) -> Option<Designator> {
        if self.lookup(name).is_some() {
            return None;
        }
        let designator = Designator::qualified(&self.function, name);
        let entry = Entry { name: name.into(), designator: designator.clone() };
        self.bucket_mut(name).push(entry);
        self.len += 1;
        Some(designator)
    }

    pub fn lookup(&self, name: &str) -> Option<&Designator> {
        self.buckets[bucket_of(name)]
            .iter()
            .find(|entry| &*entry.name == name)
            .map(|entry| &entry.designator)
    }

    pub fn remove(&mut self, name: &str) -> Option<Designator> {
        let idx = self.buckets[bucket_of(name)].iter().position(|entry| &*entry.name == name)?;
        self.len -= 1;
        Some(self.bucket_mut(name).swap_remove(idx).designator)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every binding, bucket by bucket.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Designator)> {
        self.buckets.iter().flatten().map(|entry| (&*entry.name, &entry.designator))
    }

    fn bucket_mut(&mut self, name: &str) -> &mut Vec<Entry> {
        &mut Rc::make_mut(&mut self.buckets)[bucket_of(name)]
    }
}

/// LIFO list of designators: the declared parameters while a header is bound,
/// and the saved variables while a call is in flight.
#[derive(Debug, Default, Clone)]
pub struct ParamStack {
    names: Vec<Designator>,
}

impl ParamStack {
    pub fn push(&mut self, designator: Designator) {
        self.names.push(designator);
    }

    pub fn pop(&mut self) -> Option<Designator> {
        self.names.pop()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
