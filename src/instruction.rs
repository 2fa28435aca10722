//! The intermediate representation built by the parser and rewritten by
//! the peephole optimizer.
//!
//! Pointer movement is never an instruction of its own. Every instruction
//! carries an `offset` relative to the pointer position at the most recent
//! loop boundary, and the loop delimiters are where the pointer actually
//! moves.

use bitflags::bitflags;
use std::fmt;
use std::num::Wrapping;

use self::Instruction::*;

#[cfg(test)]
use pretty_assertions::assert_eq;

/// A cell is the fundamental BF datatype that we work with. BF
/// requires this to be at least one byte, we provide a cell of
/// exactly one byte.
pub type Cell = Wrapping<i8>;

bitflags! {
    pub struct Capabilities: u8 {
        /// A following `ChangeValue` at the same offset can be folded into
        /// this instruction.
        const CAN_MERGE = 0b01;
        const LOOP_DELIMITER = 0b10;
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Instruction {
    SetAbsolute { value: Cell, offset: isize },
    ChangeValue { delta: Cell, offset: isize },
    InputByte { offset: isize },
    OutputByte { offset: isize },
    /// Moves the pointer by `offset`, then skips the loop if the cell is zero.
    LoopStart { offset: isize },
    /// Moves the pointer by `offset`, then repeats the loop if the cell is
    /// not zero.
    LoopEnd { offset: isize },
}

impl Instruction {
    pub fn offset(&self) -> isize {
        match *self {
            SetAbsolute { offset, .. }
            | ChangeValue { offset, .. }
            | InputByte { offset }
            | OutputByte { offset }
            | LoopStart { offset }
            | LoopEnd { offset } => offset,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            SetAbsolute { .. } | ChangeValue { .. } => Capabilities::CAN_MERGE,
            InputByte { .. } | OutputByte { .. } => Capabilities::empty(),
            LoopStart { .. } | LoopEnd { .. } => Capabilities::LOOP_DELIMITER,
        }
    }

    pub fn can_merge(&self) -> bool {
        self.capabilities().contains(Capabilities::CAN_MERGE)
    }

    pub fn is_loop_delimiter(&self) -> bool {
        self.capabilities().contains(Capabilities::LOOP_DELIMITER)
    }

    /// Is this `SetAbsolute { value: 0, .. }`, the result of a clear loop?
    pub fn is_clear(&self) -> bool {
        matches!(self, SetAbsolute { value: Wrapping(0), .. })
    }

    /// Fold a following change of `delta` at the same offset into this
    /// instruction. `None` means the instruction cancelled out entirely.
    pub(crate) fn merge_change(&self, delta: Cell) -> Option<Instruction> {
        match *self {
            ChangeValue { delta: prev, offset } => {
                let total = prev + delta;
                if total == Wrapping(0) {
                    None
                } else {
                    Some(ChangeValue {
                        delta: total,
                        offset,
                    })
                }
            }
            SetAbsolute { value, offset } => Some(SetAbsolute {
                value: value + delta,
                offset,
            }),
            other => unreachable!("{:?} cannot absorb a change", other),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SetAbsolute { value, offset } => write!(f, "set {} at {}", value, offset),
            ChangeValue { delta, offset } => {
                write!(f, "change value at {} by {}", offset, delta)
            }
            InputByte { offset } => write!(f, "input byte at {}", offset),
            OutputByte { offset } => write!(f, "output byte at {}", offset),
            LoopStart { offset } => write!(f, "start loop at {}", offset),
            LoopEnd { offset } => write!(f, "end loop at {}", offset),
        }
    }
}

#[test]
fn capabilities_per_variant() {
    assert!(ChangeValue {
        delta: Wrapping(1),
        offset: 0
    }
    .can_merge());
    assert!(SetAbsolute {
        value: Wrapping(0),
        offset: 0
    }
    .can_merge());
    assert!(!OutputByte { offset: 0 }.can_merge());
    assert!(!InputByte { offset: 0 }.is_loop_delimiter());
    assert!(LoopStart { offset: 0 }.is_loop_delimiter());
    assert!(LoopEnd { offset: 2 }.is_loop_delimiter());
}

#[test]
fn clear_signature() {
    assert!(SetAbsolute {
        value: Wrapping(0),
        offset: 3
    }
    .is_clear());
    assert!(!SetAbsolute {
        value: Wrapping(1),
        offset: 3
    }
    .is_clear());
    assert!(!ChangeValue {
        delta: Wrapping(0),
        offset: 0
    }
    .is_clear());
}

#[test]
fn merge_changes() {
    let change = ChangeValue {
        delta: Wrapping(3),
        offset: 1,
    };
    assert_eq!(
        change.merge_change(Wrapping(-1)),
        Some(ChangeValue {
            delta: Wrapping(2),
            offset: 1
        })
    );
    assert_eq!(change.merge_change(Wrapping(-3)), None);

    let set = SetAbsolute {
        value: Wrapping(0),
        offset: 1,
    };
    assert_eq!(
        set.merge_change(Wrapping(-1)),
        Some(SetAbsolute {
            value: Wrapping(-1),
            offset: 1
        })
    );
}

#[test]
fn merge_wraps() {
    let change = ChangeValue {
        delta: Wrapping(127),
        offset: 0,
    };
    assert_eq!(
        change.merge_change(Wrapping(1)),
        Some(ChangeValue {
            delta: Wrapping(-128),
            offset: 0
        })
    );
}

#[test]
fn offsets() {
    assert_eq!(LoopEnd { offset: -2 }.offset(), -2);
    assert_eq!(OutputByte { offset: 5 }.offset(), 5);
}
