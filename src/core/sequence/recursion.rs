// src/core/sequence/recursion.rs
use std::cell::RefCell;
use std::rc::Rc;

use super::ParticipantId;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PathFrame {
    participant: ParticipantId,
    operation: String,
}

/// Result of trying to descend into a callee
pub enum PathEntry {
    Entered(PathGuard),
    /// The callee is already on the current path
    Recursive,
    /// Descending would exceed the configured depth
    DepthLimit,
}

/// The chain of callables currently being traversed
///
/// Re-entering a callable already on the path is refused, which bounds
/// traversal of direct, mutual and template recursion alike.
#[derive(Debug, Clone, Default)]
pub struct CallPath {
    frames: Rc<RefCell<Vec<PathFrame>>>,
    max_depth: Option<usize>,
}

impl CallPath {
    pub fn new(max_depth: Option<usize>) -> Self {
        Self {
            frames: Rc::default(),
            max_depth,
        }
    }

    pub fn enter(&self, participant: ParticipantId, operation: &str) -> PathEntry {
        if self.contains(participant, operation) {
            return PathEntry::Recursive;
        }

        let mut frames = self.frames.borrow_mut();
        if let Some(max) = self.max_depth {
            if frames.len() >= max {
                return PathEntry::DepthLimit;
            }
        }

        let depth = frames.len();
        frames.push(PathFrame {
            participant,
            operation: operation.to_string(),
        });
        PathEntry::Entered(PathGuard {
            frames: Rc::clone(&self.frames),
            depth,
        })
    }

    pub fn contains(&self, participant: ParticipantId, operation: &str) -> bool {
        self.frames
            .borrow()
            .iter()
            .any(|f| f.participant == participant && f.operation == operation)
    }

    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

pub struct PathGuard {
    frames: Rc<RefCell<Vec<PathFrame>>>,
    depth: usize,
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        self.frames.borrow_mut().truncate(self.depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> ParticipantId {
        ParticipantId::from_raw(raw)
    }

    #[test]
    fn test_reentry_is_refused_until_guard_drops() {
        let path = CallPath::new(None);

        let guard = match path.enter(id(1), "f()") {
            PathEntry::Entered(guard) => guard,
            _ => panic!("first entry must succeed"),
        };
        assert!(matches!(path.enter(id(1), "f()"), PathEntry::Recursive));
        assert!(path.contains(id(1), "f()"));
        assert_eq!(path.depth(), 1);

        drop(guard);
        assert_eq!(path.depth(), 0);
        assert!(matches!(path.enter(id(1), "f()"), PathEntry::Entered(_)));
    }

    #[test]
    fn test_mutual_recursion_detected() {
        let path = CallPath::new(None);
        let _a = path.enter(id(1), "a()");
        let _b = path.enter(id(2), "b()");

        assert!(matches!(path.enter(id(1), "a()"), PathEntry::Recursive));
        assert!(matches!(path.enter(id(3), "c()"), PathEntry::Entered(_)));
    }

    #[test]
    fn test_depth_limit() {
        let path = CallPath::new(Some(2));
        let _a = path.enter(id(1), "a()");
        let _b = path.enter(id(2), "b()");

        assert!(matches!(path.enter(id(3), "c()"), PathEntry::DepthLimit));
        assert_eq!(path.depth(), 2);
    }
}
