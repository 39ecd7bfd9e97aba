// src/core/sequence/context.rs
//! Control-flow nesting recorded on every message

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use serde::Serialize;

/// Identifies one conditional, loop or try statement within a traversal
pub type BlockId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchKind {
    If,
    Constexpr,
    Switch,
    Conditional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    For,
    ForRange,
    While,
    DoWhile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum ControlFrame {
    /// One alternative of an if/else-if/else chain, switch or `?:`
    Branch {
        block: BlockId,
        kind: BranchKind,
        index: usize,
        total: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Loop {
        block: BlockId,
        kind: LoopKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// Body of the `handler`-th catch clause
    TryCatch {
        block: BlockId,
        handler: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Coroutine {
        block: BlockId,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
}

impl ControlFrame {
    pub fn block(&self) -> BlockId {
        match self {
            ControlFrame::Branch { block, .. }
            | ControlFrame::Loop { block, .. }
            | ControlFrame::TryCatch { block, .. }
            | ControlFrame::Coroutine { block, .. } => *block,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            ControlFrame::Branch { label, .. }
            | ControlFrame::Loop { label, .. }
            | ControlFrame::TryCatch { label, .. }
            | ControlFrame::Coroutine { label, .. } => label.as_deref(),
        }
    }

    /// Sibling alternative of the same statement (else after then,
    /// second catch after first)
    pub fn is_alternative_of(&self, other: &ControlFrame) -> bool {
        match (self, other) {
            (ControlFrame::Branch { block: a, index: i, .. }, ControlFrame::Branch { block: b, index: j, .. }) => {
                a == b && i != j
            }
            (ControlFrame::TryCatch { block: a, handler: i, .. }, ControlFrame::TryCatch { block: b, handler: j, .. }) => {
                a == b && i != j
            }
            _ => false,
        }
    }
}

/// Immutable snapshot of the frames enclosing a message, outermost first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ControlContext {
    frames: Vec<ControlFrame>,
}

impl ControlContext {
    pub fn frames(&self) -> &[ControlFrame] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn innermost(&self) -> Option<&ControlFrame> {
        self.frames.last()
    }

    pub fn common_prefix_len(&self, other: &ControlContext) -> usize {
        self.frames
            .iter()
            .zip(&other.frames)
            .take_while(|(a, b)| a == b)
            .count()
    }
}

impl From<Vec<ControlFrame>> for ControlContext {
    fn from(frames: Vec<ControlFrame>) -> Self {
        Self { frames }
    }
}

/// Stack of frames entered during traversal
///
/// Frames are pushed through [`ContextStack::enter`] and popped when the
/// returned guard drops, so an early exit from any visitor keeps the stack
/// balanced.
#[derive(Debug, Clone, Default)]
pub struct ContextStack {
    frames: Rc<RefCell<Vec<ControlFrame>>>,
    next_block: Rc<Cell<BlockId>>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_block(&self) -> BlockId {
        let block = self.next_block.get();
        self.next_block.set(block + 1);
        block
    }

    #[must_use = "the frame is popped as soon as the guard is dropped"]
    pub fn enter(&self, frame: ControlFrame) -> FrameGuard {
        let mut frames = self.frames.borrow_mut();
        let depth = frames.len();
        frames.push(frame);
        FrameGuard {
            frames: Rc::clone(&self.frames),
            depth,
        }
    }

    pub fn current(&self) -> ControlContext {
        ControlContext {
            frames: self.frames.borrow().clone(),
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

pub struct FrameGuard {
    frames: Rc<RefCell<Vec<ControlFrame>>>,
    depth: usize,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        self.frames.borrow_mut().truncate(self.depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(block: BlockId, index: usize) -> ControlFrame {
        ControlFrame::Branch {
            block,
            kind: BranchKind::If,
            index,
            total: 2,
            label: None,
        }
    }

    #[test]
    fn test_guard_pops_frame_on_drop() {
        let stack = ContextStack::new();
        {
            let _outer = stack.enter(branch(0, 0));
            {
                let _inner = stack.enter(ControlFrame::Loop { block: 1, kind: LoopKind::While, label: None });
                assert_eq!(stack.depth(), 2);
            }
            assert_eq!(stack.current().frames(), &[branch(0, 0)]);
        }
        assert!(stack.current().is_empty());
    }

    #[test]
    fn test_early_exit_keeps_stack_balanced() {
        fn visit(stack: &ContextStack, fail: bool) -> Result<(), ()> {
            let _frame = stack.enter(branch(stack.next_block(), 0));
            if fail {
                return Err(());
            }
            Ok(())
        }

        let stack = ContextStack::new();
        assert!(visit(&stack, true).is_err());
        assert_eq!(stack.depth(), 0);
        assert!(visit(&stack, false).is_ok());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_snapshots_are_independent_of_later_pushes() {
        let stack = ContextStack::new();
        let _frame = stack.enter(branch(0, 1));
        let snapshot = stack.current();
        let _more = stack.enter(branch(1, 0));

        assert_eq!(snapshot.depth(), 1);
        assert_eq!(stack.current().common_prefix_len(&snapshot), 1);
    }

    #[test]
    fn test_alternatives_share_block_not_index() {
        assert!(branch(3, 0).is_alternative_of(&branch(3, 1)));
        assert!(!branch(3, 0).is_alternative_of(&branch(4, 1)));
        assert!(!branch(3, 0).is_alternative_of(&branch(3, 0)));
    }

    #[test]
    fn test_block_ids_are_unique() {
        let stack = ContextStack::new();
        let a = stack.next_block();
        let b = stack.clone().next_block();
        assert_ne!(a, b);
    }
}
