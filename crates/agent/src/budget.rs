//! Iteration and tool-call caps for one question.

/// Counters for one agent invocation. Both only ever grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    max_iterations: u32,
    max_tool_calls: u32,
    iterations_used: u32,
    tool_calls_used: u32,
}

impl Budget {
    pub fn new(max_iterations: u32, max_tool_calls: u32) -> Self {
        Self {
            max_iterations,
            max_tool_calls,
            iterations_used: 0,
            tool_calls_used: 0,
        }
    }

    pub fn iterations_used(&self) -> u32 {
        self.iterations_used
    }

    pub fn tool_calls_used(&self) -> u32 {
        self.tool_calls_used
    }

    /// Whether another provider round-trip is allowed.
    pub fn can_iterate(&self) -> bool {
        self.iterations_used < self.max_iterations
    }

    /// Whether the model may still be offered tools.
    pub fn allows_tool_call(&self) -> bool {
        self.tool_calls_used < self.max_tool_calls
    }

    pub fn record_iteration(&mut self) {
        self.iterations_used += 1;
    }

    /// Take one tool call from the budget. Returns `false` when none is left.
    pub fn try_take_tool_call(&mut self) -> bool {
        if !self.allows_tool_call() {
            return false;
        }
        self.tool_calls_used += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_calls_stop_at_cap() {
        let mut budget = Budget::new(5, 2);
        assert!(budget.try_take_tool_call());
        assert!(budget.try_take_tool_call());
        assert!(!budget.try_take_tool_call());
        assert_eq!(budget.tool_calls_used(), 2);
        assert!(!budget.allows_tool_call());
    }

    #[test]
    fn iterations_stop_at_cap() {
        let mut budget = Budget::new(1, 3);
        assert!(budget.can_iterate());
        budget.record_iteration();
        assert!(!budget.can_iterate());
        assert_eq!(budget.iterations_used(), 1);
    }

    #[test]
    fn zero_tool_budget_never_allows_calls() {
        let mut budget = Budget::new(3, 0);
        assert!(!budget.allows_tool_call());
        assert!(!budget.try_take_tool_call());
    }
}
