/// The backtrackable path of visited node ids. Bottom is the start node,
/// top is the current node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationStack {
    entries: Vec<String>,
}

impl NavigationStack {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            entries: vec![start.into()],
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.entries.last().map(String::as_str)
    }

    pub fn push(&mut self, node_id: impl Into<String>) {
        self.entries.push(node_id.into());
    }

    /// Pop the current node unless it is the only one left.
    ///
    /// Returns `false` (and leaves the stack untouched) at the beginning.
    pub fn go_back(&mut self) -> bool {
        if self.entries.len() > 1 {
            self.entries.pop();
            true
        } else {
            false
        }
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &[String] {
        &self.entries
    }

    pub fn into_path(self) -> Vec<String> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_one_entry() {
        let stack = NavigationStack::new("start");
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.current(), Some("start"));
        assert!(!stack.is_empty());
    }

    #[test]
    fn go_back_at_beginning_is_a_no_op() {
        let mut stack = NavigationStack::new("start");
        assert!(!stack.go_back());
        assert!(!stack.go_back());
        assert_eq!(stack.path(), ["start".to_string()]);
    }

    #[test]
    fn go_back_pops_exactly_one() {
        let mut stack = NavigationStack::new("start");
        stack.push("billing");
        stack.push("make_payment");
        assert!(stack.go_back());
        assert_eq!(stack.current(), Some("billing"));
        assert_eq!(stack.depth(), 2);
        assert!(stack.go_back());
        assert!(!stack.go_back());
        assert_eq!(stack.into_path(), vec!["start".to_string()]);
    }

    #[test]
    fn revisiting_a_node_stacks_it_again() {
        let mut stack = NavigationStack::new("start");
        stack.push("menu");
        stack.push("start");
        stack.push("menu");
        assert_eq!(stack.depth(), 4);
    }
}
