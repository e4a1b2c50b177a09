// IntervalTimeline - AVL-balanced interval tree for overlap queries
// Keyed by (low, seq), nodes carry height and subtree max(high) for pruning

use super::event_timeline::{time_lt, time_lte};
use crate::error::{TimingError, TimingResult};

/// An event spanning the half-open range `[low, high)`
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalEvent<T> {
    pub low: f64,
    pub high: f64,
    pub seq: u64,
    pub payload: T,
}

struct Node<T> {
    event: IntervalEvent<T>,
    height: i32,
    max_high: f64,
    left: Link<T>,
    right: Link<T>,
}

type Link<T> = Option<Box<Node<T>>>;

fn height<T>(link: &Link<T>) -> i32 {
    link.as_ref().map_or(0, |n| n.height)
}

fn max_high<T>(link: &Link<T>) -> f64 {
    link.as_ref().map_or(f64::NEG_INFINITY, |n| n.max_high)
}

impl<T> Node<T> {
    fn new(event: IntervalEvent<T>) -> Box<Self> {
        let max_high = event.high;
        Box::new(Self {
            event,
            height: 1,
            max_high,
            left: None,
            right: None,
        })
    }

    /// Recompute height and subtree max(high) from the children
    fn update(&mut self) {
        self.height = 1 + height(&self.left).max(height(&self.right));
        self.max_high = self
            .event
            .high
            .max(max_high(&self.left))
            .max(max_high(&self.right));
    }

    fn balance_factor(&self) -> i32 {
        height(&self.left) - height(&self.right)
    }

    /// Node keys are (low, seq); seq makes duplicate lows totally ordered
    fn key(&self) -> (f64, u64) {
        (self.event.low, self.event.seq)
    }
}

fn key_lt(a: (f64, u64), b: (f64, u64)) -> bool {
    a.0 < b.0 || (a.0 == b.0 && a.1 < b.1)
}

fn rotate_right<T>(mut node: Box<Node<T>>) -> Box<Node<T>> {
    let mut pivot = node.left.take().expect("rotate_right requires a left child");
    node.left = pivot.right.take();
    node.update();
    pivot.right = Some(node);
    pivot.update();
    pivot
}

fn rotate_left<T>(mut node: Box<Node<T>>) -> Box<Node<T>> {
    let mut pivot = node.right.take().expect("rotate_left requires a right child");
    node.right = pivot.left.take();
    node.update();
    pivot.left = Some(node);
    pivot.update();
    pivot
}

/// Restore the AVL invariant at this node after an insert or removal
fn rebalance<T>(mut node: Box<Node<T>>) -> Box<Node<T>> {
    node.update();
    let factor = node.balance_factor();
    if factor > 1 {
        if node.left.as_ref().map_or(0, |n| n.balance_factor()) < 0 {
            node.left = node.left.take().map(rotate_left);
            node.update();
        }
        rotate_right(node)
    } else if factor < -1 {
        if node.right.as_ref().map_or(0, |n| n.balance_factor()) > 0 {
            node.right = node.right.take().map(rotate_right);
            node.update();
        }
        rotate_left(node)
    } else {
        node
    }
}

fn insert_node<T>(link: Link<T>, event: IntervalEvent<T>) -> Box<Node<T>> {
    match link {
        None => Node::new(event),
        Some(mut node) => {
            if key_lt((event.low, event.seq), node.key()) {
                node.left = Some(insert_node(node.left.take(), event));
            } else {
                node.right = Some(insert_node(node.right.take(), event));
            }
            rebalance(node)
        }
    }
}

/// Detach the minimum-key node of a subtree, returning (rest, event)
fn take_min<T>(mut node: Box<Node<T>>) -> (Link<T>, IntervalEvent<T>) {
    match node.left.take() {
        None => (node.right.take(), node.event),
        Some(left) => {
            let (rest, min) = take_min(left);
            node.left = rest;
            (Some(rebalance(node)), min)
        }
    }
}

/// Detach the maximum-key node of a subtree, returning (rest, event)
fn take_max<T>(mut node: Box<Node<T>>) -> (Link<T>, IntervalEvent<T>) {
    match node.right.take() {
        None => (node.left.take(), node.event),
        Some(right) => {
            let (rest, max) = take_max(right);
            node.right = rest;
            (Some(rebalance(node)), max)
        }
    }
}

fn remove_node<T>(link: Link<T>, low: f64, seq: u64) -> (Link<T>, Option<IntervalEvent<T>>) {
    let Some(mut node) = link else {
        return (None, None);
    };

    if node.key() == (low, seq) {
        let removed = match (node.left.take(), node.right.take()) {
            (None, None) => (None, Some(node.event)),
            (Some(left), None) => (Some(left), Some(node.event)),
            (None, Some(right)) => (Some(right), Some(node.event)),
            (Some(left), Some(right)) => {
                // Pull the replacement from the taller subtree so the
                // removal cannot worsen the imbalance.
                let mut replacement = if left.height >= right.height {
                    let (rest, predecessor) = take_max(left);
                    let mut repl = Node::new(predecessor);
                    repl.left = rest;
                    repl.right = Some(right);
                    repl
                } else {
                    let (rest, successor) = take_min(right);
                    let mut repl = Node::new(successor);
                    repl.left = Some(left);
                    repl.right = rest;
                    repl
                };
                replacement.update();
                (Some(rebalance(replacement)), Some(node.event))
            }
        };
        removed
    } else if key_lt((low, seq), node.key()) {
        let (rest, removed) = remove_node(node.left.take(), low, seq);
        node.left = rest;
        (Some(rebalance(node)), removed)
    } else {
        let (rest, removed) = remove_node(node.right.take(), low, seq);
        node.right = rest;
        (Some(rebalance(node)), removed)
    }
}

fn search_node<'a, T>(link: &'a Link<T>, point: f64, out: &mut Vec<&'a IntervalEvent<T>>) {
    let Some(node) = link else { return };
    // No interval below this node reaches past the point
    if !time_lt(point, node.max_high) {
        return;
    }
    search_node(&node.left, point, out);
    if time_lte(node.event.low, point) && time_lt(point, node.event.high) {
        out.push(&node.event);
    }
    // Right subtree lows are all >= this node's low
    if time_lte(node.event.low, point) {
        search_node(&node.right, point, out);
    }
}

fn search_after_node<'a, T>(link: &'a Link<T>, point: f64, out: &mut Vec<&'a IntervalEvent<T>>) {
    let Some(node) = link else { return };
    if !time_lt(node.event.low, point) {
        search_after_node(&node.left, point, out);
        out.push(&node.event);
        search_after_node(&node.right, point, out);
    } else {
        search_after_node(&node.right, point, out);
    }
}

fn for_each_node<'a, T>(link: &'a Link<T>, f: &mut impl FnMut(&'a IntervalEvent<T>)) {
    if let Some(node) = link {
        for_each_node(&node.left, f);
        f(&node.event);
        for_each_node(&node.right, f);
    }
}

/// Self-balancing interval tree
///
/// Stores half-open intervals `[low, high)` and answers point-overlap and
/// starts-at-or-after queries in O(log n + k). Used to bound the memory
/// of repeating schedules: a repeat holds one interval regardless of how
/// many occurrences it spawns.
pub struct IntervalTimeline<T> {
    root: Link<T>,
    len: usize,
    next_seq: u64,
}

impl<T> Default for IntervalTimeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IntervalTimeline<T> {
    pub fn new() -> Self {
        Self {
            root: None,
            len: 0,
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Tree height; O(log n) after any sequence of inserts and removals
    pub fn height(&self) -> i32 {
        height(&self.root)
    }

    /// Insert `[low, high)`, returning the event's sequence id
    pub fn insert(&mut self, low: f64, high: f64, payload: T) -> TimingResult<u64> {
        TimingError::check_finite("interval low", low)?;
        if !high.is_finite() && high != f64::INFINITY {
            return Err(TimingError::InvalidArgument {
                what: "interval high",
                value: high,
            });
        }
        if high < low {
            return Err(TimingError::InvalidArgument {
                what: "interval high below low",
                value: high,
            });
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let event = IntervalEvent {
            low,
            high,
            seq,
            payload,
        };
        self.root = Some(insert_node(self.root.take(), event));
        self.len += 1;
        Ok(seq)
    }

    /// Remove the interval inserted with this `(low, seq)` pair
    pub fn remove(&mut self, low: f64, seq: u64) -> Option<IntervalEvent<T>> {
        let (root, removed) = remove_node(self.root.take(), low, seq);
        self.root = root;
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Every interval containing `point`, ascending by `(low, seq)`
    pub fn search(&self, point: f64) -> Vec<&IntervalEvent<T>> {
        let mut out = Vec::new();
        search_node(&self.root, point, &mut out);
        out
    }

    /// Every interval with `low >= point`, ascending by `(low, seq)`
    pub fn search_after(&self, point: f64) -> Vec<&IntervalEvent<T>> {
        let mut out = Vec::new();
        search_after_node(&self.root, point, &mut out);
        out
    }

    /// The containing interval with the greatest low (latest-starting)
    pub fn get(&self, point: f64) -> Option<&IntervalEvent<T>> {
        self.search(point).into_iter().last()
    }

    /// In-order traversal of every interval
    pub fn for_each<'a>(&'a self, mut f: impl FnMut(&'a IntervalEvent<T>)) {
        for_each_node(&self.root, &mut f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(intervals: &[(f64, f64)]) -> IntervalTimeline<usize> {
        let mut tree = IntervalTimeline::new();
        for (i, &(low, high)) in intervals.iter().enumerate() {
            tree.insert(low, high, i).unwrap();
        }
        tree
    }

    #[test]
    fn test_search_point_containment() {
        let tree = tree_of(&[(0.0, 2.0), (1.0, 3.0), (2.0, 4.0), (5.0, 6.0)]);

        let hits: Vec<usize> = tree.search(1.5).iter().map(|ev| ev.payload).collect();
        assert_eq!(hits, vec![0, 1]);

        // Half-open: high is excluded, low is included
        let hits: Vec<usize> = tree.search(2.0).iter().map(|ev| ev.payload).collect();
        assert_eq!(hits, vec![1, 2]);

        assert!(tree.search(4.5).is_empty());
        assert!(tree.search(-1.0).is_empty());
    }

    #[test]
    fn test_get_returns_latest_starting_match() {
        let tree = tree_of(&[(0.0, 10.0), (2.0, 10.0), (4.0, 10.0)]);
        assert_eq!(tree.get(5.0).unwrap().payload, 2);
        assert_eq!(tree.get(3.0).unwrap().payload, 1);
        assert!(tree.get(11.0).is_none());
    }

    #[test]
    fn test_search_after() {
        let tree = tree_of(&[(0.0, 1.0), (2.0, 3.0), (4.0, 5.0)]);

        let hits: Vec<usize> = tree.search_after(2.0).iter().map(|ev| ev.payload).collect();
        assert_eq!(hits, vec![1, 2]);

        let hits: Vec<usize> = tree.search_after(10.0).iter().map(|ev| ev.payload).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut tree = IntervalTimeline::new();
        let a = tree.insert(0.0, 2.0, "a").unwrap();
        let b = tree.insert(1.0, 3.0, "b").unwrap();

        let removed = tree.remove(0.0, a).unwrap();
        assert_eq!(removed.payload, "a");
        assert_eq!(tree.len(), 1);
        assert!(tree.remove(0.0, a).is_none());

        let hits: Vec<&str> = tree.search(1.5).iter().map(|ev| ev.payload).collect();
        assert_eq!(hits, vec!["b"]);
        assert!(tree.remove(1.0, b).is_some());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_duplicate_lows() {
        let mut tree = IntervalTimeline::new();
        let ids: Vec<u64> = (0..4).map(|i| tree.insert(1.0, 2.0, i).unwrap()).collect();

        assert_eq!(tree.search(1.0).len(), 4);
        for id in ids {
            assert!(tree.remove(1.0, id).is_some());
        }
        assert!(tree.is_empty());
    }

    #[test]
    fn test_open_ended_interval() {
        let mut tree = IntervalTimeline::new();
        tree.insert(1.0, f64::INFINITY, ()).unwrap();
        assert_eq!(tree.search(1_000_000.0).len(), 1);
        assert!(tree.search(0.5).is_empty());
    }

    #[test]
    fn test_invalid_intervals_rejected() {
        let mut tree: IntervalTimeline<()> = IntervalTimeline::new();
        assert!(tree.insert(f64::NAN, 1.0, ()).is_err());
        assert!(tree.insert(2.0, 1.0, ()).is_err());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_matches_brute_force_reference() {
        use rand::{Rng, SeedableRng, rngs::StdRng};
        let mut rng = StdRng::seed_from_u64(7);

        let mut tree = IntervalTimeline::new();
        let mut reference: Vec<(f64, f64, u64)> = Vec::new();

        for i in 0..500 {
            let low = rng.gen_range(0.0..100.0);
            let high = low + rng.gen_range(0.0..20.0);
            let seq = tree.insert(low, high, i).unwrap();
            reference.push((low, high, seq));
        }
        // Remove a random third
        for _ in 0..166 {
            let idx = rng.gen_range(0..reference.len());
            let (low, _, seq) = reference.swap_remove(idx);
            assert!(tree.remove(low, seq).is_some());
        }

        for _ in 0..200 {
            let point = rng.gen_range(-5.0..110.0);
            let mut expected: Vec<u64> = reference
                .iter()
                .filter(|&&(low, high, _)| low <= point && point < high)
                .map(|&(_, _, seq)| seq)
                .collect();
            expected.sort_unstable();

            let mut found: Vec<u64> = tree.search(point).iter().map(|ev| ev.seq).collect();
            found.sort_unstable();
            assert_eq!(found, expected, "mismatch at point {point}");
        }
    }

    #[test]
    fn test_height_stays_logarithmic() {
        use rand::{Rng, SeedableRng, rngs::StdRng};
        let mut rng = StdRng::seed_from_u64(11);

        let mut tree = IntervalTimeline::new();
        let mut live: Vec<(f64, u64)> = Vec::new();

        for i in 0..2000 {
            let low = rng.gen_range(0.0..1000.0);
            let seq = tree.insert(low, low + 1.0, i).unwrap();
            live.push((low, seq));
            if i % 3 == 0 {
                let idx = rng.gen_range(0..live.len());
                let (low, seq) = live.swap_remove(idx);
                tree.remove(low, seq);
            }
        }

        // AVL height bound: h < 1.45 * log2(n + 2)
        let n = tree.len() as f64;
        let bound = (1.45 * (n + 2.0).log2()).ceil() as i32;
        assert!(
            tree.height() <= bound,
            "height {} exceeds AVL bound {} for {} nodes",
            tree.height(),
            bound,
            tree.len()
        );
    }

    #[test]
    fn test_sorted_insert_stays_balanced() {
        let mut tree = IntervalTimeline::new();
        for i in 0..1024 {
            tree.insert(i as f64, i as f64 + 0.5, i).unwrap();
        }
        // Perfectly sorted input is the classic degenerate case for an
        // unbalanced BST; AVL keeps it near log2(1024) = 10.
        assert!(tree.height() <= 15);
    }
}
