use std::collections::hash_map::DefaultHasher;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use hashbrown::HashMap;
use indexmap::IndexSet;

#[cfg(test)]
mod tests;

/// Regular language over an alphabet of `V`.
///
/// Values are only ever built through the smart constructors ([`Regex::union`],
/// [`Regex::concatenate`], [`Regex::star`]), which keep every node simplified:
/// no union with an empty side, no union of equal operands, no concatenation
/// with the empty string and no star over the empty string or empty language.
#[derive(Clone)]
pub enum Regex<V> {
    Plain(V),
    Union(Rc<Regex<V>>, Rc<Regex<V>>),
    Concatenate(Rc<Regex<V>>, Rc<Regex<V>>),
    Star(Rc<Regex<V>>),
    Epsilon,
    EmptySet,
}

impl<V> Regex<V> {
    pub fn plain(v: V) -> Self {
        Self::Plain(v)
    }

    /// The language containing only the empty word.
    pub const fn epsilon() -> Self {
        Self::Epsilon
    }

    /// The empty language.
    pub const fn empty_set() -> Self {
        Self::EmptySet
    }

    pub fn is_epsilon(&self) -> bool {
        matches!(self, Self::Epsilon)
    }

    pub fn is_empty_set(&self) -> bool {
        matches!(self, Self::EmptySet)
    }
}

impl<V: PartialEq + Clone> Regex<V> {
    pub fn union(a: Self, b: Self) -> Self {
        if a.is_empty_set() {
            return b;
        }
        if b.is_empty_set() {
            return a;
        }
        Self::simplify(Self::Union(Rc::new(a), Rc::new(b)))
    }

    pub fn concatenate(a: Self, b: Self) -> Self {
        if a.is_empty_set() {
            return a;
        }
        if b.is_epsilon() {
            return a;
        }
        if a.is_epsilon() {
            return b;
        }
        if b.is_empty_set() {
            return b;
        }
        Self::simplify(Self::Concatenate(Rc::new(a), Rc::new(b)))
    }

    pub fn star(a: Self) -> Self {
        if a.is_empty_set() || a.is_epsilon() {
            return Self::epsilon();
        }
        Self::simplify(Self::Star(Rc::new(a)))
    }

    /// Collapses a freshly built node whose operands are already simplified.
    pub fn simplify(node: Self) -> Self {
        match node {
            Self::Union(a, b) => {
                if a.is_empty_set() {
                    return unwrap_rc(b);
                }
                if b.is_empty_set() || a == b {
                    return unwrap_rc(a);
                }
                Self::Union(a, b)
            }
            Self::Concatenate(a, b) => {
                if a.is_empty_set() || b.is_empty_set() {
                    return Self::empty_set();
                }
                if a.is_epsilon() {
                    return unwrap_rc(b);
                }
                if b.is_epsilon() {
                    return unwrap_rc(a);
                }
                Self::Concatenate(a, b)
            }
            Self::Star(a) => {
                if a.is_empty_set() || a.is_epsilon() {
                    return Self::epsilon();
                }
                Self::Star(a)
            }
            other => other,
        }
    }

    /// Returns true if `el` is `regex` itself or one of its (nested) union branches.
    pub fn contains(regex: &Self, el: &Self) -> bool {
        match regex {
            Self::Union(a, b) => Self::contains(a, el) || Self::contains(b, el),
            _ => regex == el,
        }
    }
}

fn unwrap_rc<V: Clone>(rc: Rc<Regex<V>>) -> Regex<V> {
    Rc::try_unwrap(rc).unwrap_or_else(|shared| (*shared).clone())
}

impl<V: PartialEq> PartialEq for Regex<V> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Plain(a), Self::Plain(b)) => a == b,
            (Self::Union(a1, b1), Self::Union(a2, b2)) => {
                (a1 == a2 && b1 == b2) || (a1 == b2 && b1 == a2)
            }
            (Self::Concatenate(a1, b1), Self::Concatenate(a2, b2)) => a1 == a2 && b1 == b2,
            (Self::Star(a), Self::Star(b)) => a == b,
            (Self::Epsilon, Self::Epsilon) | (Self::EmptySet, Self::EmptySet) => true,
            _ => false,
        }
    }
}

impl<V: Eq> Eq for Regex<V> {}

fn hash_of<T: Hash + ?Sized>(t: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    t.hash(&mut hasher);
    hasher.finish()
}

impl<V: Hash> Hash for Regex<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Plain(v) => {
                state.write_u8(0);
                v.hash(state);
            }
            // Order independent so that commutative equality stays consistent
            Self::Union(a, b) => {
                state.write_u8(1);
                state.write_u64(hash_of(a.as_ref()).wrapping_add(hash_of(b.as_ref())));
            }
            Self::Concatenate(a, b) => {
                state.write_u8(2);
                a.hash(state);
                b.hash(state);
            }
            Self::Star(a) => {
                state.write_u8(3);
                a.hash(state);
            }
            Self::Epsilon => state.write_u8(4),
            Self::EmptySet => state.write_u8(5),
        }
    }
}

impl<V: Display> Display for Regex<V> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Plain(v) => write!(f, "{v}"),
            Self::Union(a, b) => write!(f, "{{{a} U {b}}}"),
            Self::Concatenate(a, b) => write!(f, "({a} . {b})"),
            Self::Star(a) => write!(f, "[{a}]* "),
            Self::Epsilon => write!(f, "EPSILON"),
            Self::EmptySet => write!(f, "EMPTY"),
        }
    }
}

impl<V: Display> Debug for Regex<V> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

/// A labelled graph whose paths can be summarised as a [`Regex`].
///
/// `None` labels stand for the empty word.
pub trait LabelledGraph {
    type State: Hash + Eq + Clone;
    type Label: Clone + PartialEq;

    fn labelled_edges(&self) -> Vec<(Self::State, Option<Self::Label>, Self::State)>;
}

/// Computes the language of all paths from `from` to `to` by state elimination.
pub fn path_expression<G: LabelledGraph>(
    graph: &G,
    from: &G::State,
    to: &G::State,
) -> Regex<G::Label> {
    let mut states: IndexSet<G::State> = IndexSet::new();
    states.insert(from.clone());
    states.insert(to.clone());

    let mut table: HashMap<(usize, usize), Regex<G::Label>> = HashMap::new();
    for (start, label, target) in graph.labelled_edges() {
        let (s, _) = states.insert_full(start);
        let (t, _) = states.insert_full(target);
        let letter = match label {
            Some(l) => Regex::plain(l),
            None => Regex::epsilon(),
        };
        let entry = table.remove(&(s, t)).unwrap_or(Regex::EmptySet);
        table.insert((s, t), Regex::union(entry, letter));
    }

    let source = 0;
    let sink = states.get_index_of(to).unwrap_or(0);

    for k in 0..states.len() {
        if k == source || k == sink {
            continue;
        }
        let looping = Regex::star(table.remove(&(k, k)).unwrap_or(Regex::EmptySet));
        let preds: Vec<_> = table
            .iter()
            .filter(|((i, j), _)| *j == k && *i != k)
            .map(|((i, _), r)| (*i, r.clone()))
            .collect();
        let succs: Vec<_> = table
            .iter()
            .filter(|((i, j), _)| *i == k && *j != k)
            .map(|((_, j), r)| (*j, r.clone()))
            .collect();
        for (i, into) in &preds {
            for (j, out) in &succs {
                let through = Regex::concatenate(
                    Regex::concatenate(into.clone(), looping.clone()),
                    out.clone(),
                );
                let entry = table.remove(&(*i, *j)).unwrap_or(Regex::EmptySet);
                table.insert((*i, *j), Regex::union(entry, through));
            }
        }
        table.retain(|(i, j), _| *i != k && *j != k);
    }

    let get = |i, j| table.get(&(i, j)).cloned().unwrap_or(Regex::EmptySet);
    if source == sink {
        return Regex::star(get(source, source));
    }
    let a = get(source, source);
    let b = get(source, sink);
    let c = get(sink, source);
    let d = get(sink, sink);
    // (A U B D* C)* B D*
    let d_star = Regex::star(d);
    let back = Regex::concatenate(Regex::concatenate(b.clone(), d_star.clone()), c);
    Regex::concatenate(
        Regex::concatenate(Regex::star(Regex::union(a, back)), b),
        d_star,
    )
}
