use hashbrown::HashSet;
use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;

use super::{path_expression, LabelledGraph, Regex};

#[derive(Clone, Debug)]
struct Lang(Regex<char>);

fn arbitrary_regex(g: &mut Gen, depth: usize) -> Regex<char> {
    let choice = if depth == 0 {
        u8::arbitrary(g) % 3
    } else {
        u8::arbitrary(g) % 6
    };
    match choice {
        0 => Regex::plain(*g.choose(&['a', 'b', 'c']).unwrap()),
        1 => Regex::epsilon(),
        2 => Regex::empty_set(),
        3 => Regex::union(arbitrary_regex(g, depth - 1), arbitrary_regex(g, depth - 1)),
        4 => Regex::concatenate(arbitrary_regex(g, depth - 1), arbitrary_regex(g, depth - 1)),
        _ => Regex::star(arbitrary_regex(g, depth - 1)),
    }
}

impl Arbitrary for Lang {
    fn arbitrary(g: &mut Gen) -> Self {
        let depth = usize::arbitrary(g) % 4;
        Lang(arbitrary_regex(g, depth))
    }
}

fn plain(c: char) -> Regex<char> {
    Regex::plain(c)
}

#[quickcheck]
fn union_with_empty_set_is_identity(a: Lang) -> bool {
    Regex::union(Regex::empty_set(), a.0.clone()) == a.0
        && Regex::union(a.0.clone(), Regex::empty_set()) == a.0
}

#[quickcheck]
fn concatenate_with_epsilon_is_identity(a: Lang) -> bool {
    Regex::concatenate(a.0.clone(), Regex::epsilon()) == a.0
        && Regex::concatenate(Regex::epsilon(), a.0.clone()) == a.0
}

#[quickcheck]
fn union_is_idempotent(a: Lang) -> bool {
    Regex::union(a.0.clone(), a.0.clone()) == a.0
}

#[quickcheck]
fn union_is_commutative(a: Lang, b: Lang) -> bool {
    let ab = Regex::union(a.0.clone(), b.0.clone());
    let ba = Regex::union(b.0, a.0);
    let mut set = HashSet::new();
    set.insert(ab.clone());
    ab == ba && set.contains(&ba)
}

#[quickcheck]
fn concatenate_with_empty_set_is_empty(a: Lang) -> bool {
    Regex::concatenate(Regex::empty_set(), a.0.clone()).is_empty_set()
        && Regex::concatenate(a.0, Regex::empty_set()).is_empty_set()
}

#[quickcheck]
fn constructors_never_leak_unsimplified_nodes(a: Lang) -> bool {
    fn simplified(r: &Regex<char>) -> bool {
        match r {
            Regex::Union(a, b) => {
                !a.is_empty_set() && !b.is_empty_set() && a != b && simplified(a) && simplified(b)
            }
            Regex::Concatenate(a, b) => {
                !a.is_epsilon()
                    && !b.is_epsilon()
                    && !a.is_empty_set()
                    && !b.is_empty_set()
                    && simplified(a)
                    && simplified(b)
            }
            Regex::Star(a) => !a.is_epsilon() && !a.is_empty_set() && simplified(a),
            _ => true,
        }
    }
    simplified(&a.0)
}

#[test]
fn star_of_trivial_languages() {
    assert_eq!(Regex::<char>::star(Regex::empty_set()), Regex::epsilon());
    assert_eq!(Regex::<char>::star(Regex::epsilon()), Regex::epsilon());
    assert!(matches!(Regex::star(plain('a')), Regex::Star(_)));
}

#[test]
fn contains_looks_through_nested_unions() {
    let abc = Regex::union(Regex::union(plain('a'), plain('b')), plain('c'));
    assert!(Regex::contains(&abc, &plain('a')));
    assert!(Regex::contains(&abc, &plain('c')));
    assert!(!Regex::contains(&abc, &plain('d')));
    assert!(Regex::contains(&plain('d'), &plain('d')));

    let concat = Regex::concatenate(plain('a'), plain('b'));
    assert!(!Regex::contains(&concat, &plain('a')));
}

#[test]
fn concatenation_is_not_commutative() {
    let ab = Regex::concatenate(plain('a'), plain('b'));
    let ba = Regex::concatenate(plain('b'), plain('a'));
    assert_ne!(ab, ba);
}

#[test]
fn display() {
    let r = Regex::concatenate(
        Regex::union(plain('a'), plain('b')),
        Regex::star(plain('c')),
    );
    assert_eq!(r.to_string(), "({a U b} . [c]* )");
    assert_eq!(Regex::<char>::epsilon().to_string(), "EPSILON");
    assert_eq!(Regex::<char>::empty_set().to_string(), "EMPTY");
}

struct Edges(Vec<(u32, Option<char>, u32)>);

impl LabelledGraph for Edges {
    type State = u32;
    type Label = char;

    fn labelled_edges(&self) -> Vec<(u32, Option<char>, u32)> {
        self.0.clone()
    }
}

#[test]
fn path_expression_of_loop() {
    let graph = Edges(vec![(0, Some('x'), 1), (1, Some('y'), 1), (1, Some('z'), 2)]);
    let expected = Regex::concatenate(
        Regex::concatenate(plain('x'), Regex::star(plain('y'))),
        plain('z'),
    );
    assert_eq!(path_expression(&graph, &0, &2), expected);
}

#[test]
fn path_expression_of_branches() {
    let graph = Edges(vec![
        (0, Some('f'), 1),
        (0, Some('g'), 1),
        (1, None, 2),
    ]);
    let expected = Regex::union(plain('f'), plain('g'));
    assert_eq!(path_expression(&graph, &0, &2), expected);
}

#[test]
fn path_expression_without_path_is_empty() {
    let graph = Edges(vec![(0, Some('f'), 1), (2, Some('g'), 3)]);
    assert!(path_expression(&graph, &0, &3).is_empty_set());
}
