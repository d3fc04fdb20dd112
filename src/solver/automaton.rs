use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hash;

use hashbrown::HashMap;
use indexmap::IndexSet;

use crate::path_expression::LabelledGraph;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Transition<S, L> {
    pub start: S,
    pub label: L,
    pub target: S,
}

impl<S, L> Transition<S, L> {
    pub fn new(start: S, label: L, target: S) -> Self {
        Self {
            start,
            label,
            target,
        }
    }
}

impl<S: Display, L: Display> Display for Transition<S, L> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} --{}--> {}", self.start, self.label, self.target)
    }
}

impl<S: Display, L: Display> Debug for Transition<S, L> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

/// Identifies a listener owned by whoever subscribed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ListenerId(pub usize);

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Subscription<S> {
    Any,
    From(S),
}

/// Insertion-ordered set of transitions with per-state indices and
/// subscriptions.
pub struct Automaton<S, L> {
    transitions: IndexSet<Transition<S, L>>,
    outgoing: HashMap<S, Vec<usize>>,
    incoming: HashMap<S, Vec<usize>>,
    any_listeners: Vec<(usize, ListenerId)>,
    state_listeners: HashMap<S, Vec<(usize, ListenerId)>>,
    next_subscription: usize,
}

impl<S, L> Default for Automaton<S, L> {
    fn default() -> Self {
        Self {
            transitions: IndexSet::new(),
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
            any_listeners: vec![],
            state_listeners: HashMap::new(),
            next_subscription: 0,
        }
    }
}

impl<S, L> Automaton<S, L>
where
    S: Clone + Eq + Hash,
    L: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a transition. Returns the listeners to notify, in the order
    /// they subscribed, or `None` if the transition was already present.
    pub fn add_transition(&mut self, t: Transition<S, L>) -> Option<Vec<ListenerId>> {
        if self.transitions.contains(&t) {
            return None;
        }
        let index = self.transitions.len();
        self.outgoing.entry(t.start.clone()).or_default().push(index);
        self.incoming.entry(t.target.clone()).or_default().push(index);

        let mut listeners: Vec<(usize, ListenerId)> = self.any_listeners.clone();
        if let Some(state_listeners) = self.state_listeners.get(&t.start) {
            listeners.extend(state_listeners.iter().copied());
            listeners.sort_unstable_by_key(|(order, _)| *order);
        }
        self.transitions.insert(t);
        Some(listeners.into_iter().map(|(_, id)| id).collect())
    }

    /// Registers `id` and returns the already present transitions matching
    /// the subscription, so that late subscribers see the full history.
    pub fn subscribe(&mut self, subscription: Subscription<S>, id: ListenerId) -> Vec<Transition<S, L>> {
        let order = self.next_subscription;
        self.next_subscription += 1;
        match subscription {
            Subscription::Any => {
                self.any_listeners.push((order, id));
                self.transitions.iter().cloned().collect()
            }
            Subscription::From(state) => {
                let replay = self.outgoing_of(&state).cloned().collect();
                self.state_listeners
                    .entry(state)
                    .or_default()
                    .push((order, id));
                replay
            }
        }
    }

    pub fn contains(&self, t: &Transition<S, L>) -> bool {
        self.transitions.contains(t)
    }

    pub fn outgoing_of<'a>(&'a self, state: &S) -> impl Iterator<Item = &'a Transition<S, L>> + 'a {
        self.indexed(self.outgoing.get(state))
    }

    pub fn incoming_of<'a>(&'a self, state: &S) -> impl Iterator<Item = &'a Transition<S, L>> + 'a {
        self.indexed(self.incoming.get(state))
    }

    fn indexed<'a>(
        &'a self,
        indices: Option<&'a Vec<usize>>,
    ) -> impl Iterator<Item = &'a Transition<S, L>> + 'a {
        indices
            .into_iter()
            .flatten()
            .filter_map(|&i| self.transitions.get_index(i))
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition<S, L>> {
        self.transitions.iter()
    }

    pub fn states(&self) -> IndexSet<S> {
        self.transitions
            .iter()
            .flat_map(|t| [t.start.clone(), t.target.clone()])
            .collect()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// Field automata read as graphs whose epsilon-field edges carry no label.
pub trait EpsilonLabel {
    fn is_epsilon_label(&self) -> bool;
}

impl EpsilonLabel for crate::program::Field {
    fn is_epsilon_label(&self) -> bool {
        self.is_epsilon()
    }
}

impl<S, L> LabelledGraph for Automaton<S, L>
where
    S: Clone + Eq + Hash,
    L: Clone + Eq + Hash + EpsilonLabel,
{
    type State = S;
    type Label = L;

    fn labelled_edges(&self) -> Vec<(S, Option<L>, S)> {
        self.transitions
            .iter()
            .map(|t| {
                let label = (!t.label.is_epsilon_label()).then(|| t.label.clone());
                (t.start.clone(), label, t.target.clone())
            })
            .collect()
    }
}
