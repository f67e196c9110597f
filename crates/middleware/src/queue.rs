/// Reserved path segment addressing a queue's dead-letter sub-queue
pub const DEAD_LETTER_SEGMENT: &str = "/$DeadLetterQueue";

/// Which half of a queue a peek targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum QueueKind {
    #[default]
    Active,
    DeadLetter,
}

impl QueueKind {
    pub fn is_dead_letter(self) -> bool {
        matches!(self, QueueKind::DeadLetter)
    }

    /// Effective broker path for a queue name: `{name}` or `{name}/$DeadLetterQueue`
    pub fn queue_path(self, queue_name: &str) -> String {
        match self {
            QueueKind::Active => queue_name.to_string(),
            QueueKind::DeadLetter => format!("{}{}", queue_name, DEAD_LETTER_SEGMENT),
        }
    }
}

/// Strip the dead-letter segment, returning the parent queue name if present
pub fn parent_queue(queue_path: &str) -> Option<&str> {
    queue_path.strip_suffix(DEAD_LETTER_SEGMENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_path_unchanged() {
        assert_eq!(QueueKind::Active.queue_path("orders"), "orders");
    }

    #[test]
    fn test_dead_letter_path() {
        assert_eq!(
            QueueKind::DeadLetter.queue_path("orders"),
            "orders/$DeadLetterQueue"
        );
    }

    #[test]
    fn test_parent_queue() {
        assert_eq!(parent_queue("orders/$DeadLetterQueue"), Some("orders"));
        assert_eq!(parent_queue("orders"), None);
    }

    #[test]
    fn test_default_is_active() {
        assert!(!QueueKind::default().is_dead_letter());
        assert!(QueueKind::DeadLetter.is_dead_letter());
    }
}
