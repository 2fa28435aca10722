//! Optimisations that rewrite a small window of instructions while the
//! chunk is being built. The unoptimized instruction list is never
//! materialized: every builder call sees the already-optimized prefix and
//! rewrites its tail.

use crate::chunk::Chunk;
use crate::instruction::Instruction::{self, *};
use crate::instruction::Cell;
use bitflags::bitflags;
use std::num::Wrapping;
use thiserror::Error;

bitflags! {
    pub struct OptimisationsFlags: u8 {
        /// Sum adjacent changes to the same cell, and drop changes that sum
        /// to zero.
        const COMBINE_CHANGES = 0b0001;
        /// Drop writes that a following input or set overwrites.
        const DEAD_STORES = 0b0010;
        /// Remove loops whose cell is known to be zero on entry.
        const DEAD_LOOPS = 0b0100;
        /// Replace `[-]` style loops with a set to zero.
        const CLEAR_LOOPS = 0b1000;
    }
}

impl Default for OptimisationsFlags {
    fn default() -> Self {
        OptimisationsFlags::all()
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum BuildError {
    #[error("chunk has already been finalized")]
    AlreadyFinalized,
    #[error("cannot pop from an empty instruction list")]
    EmptyPop,
    #[error("cannot finalize a chunk with unclosed loops")]
    UnclosedLoop,
    #[error("loop end without a loop start")]
    UnmatchedLoopEnd,
}

/// What `end_loop` did with the loop it closed.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LoopRewrite {
    Kept,
    /// The loop can never run and was dropped.
    Removed,
    /// The loop was replaced by a set to zero.
    Cleared,
}

#[derive(Debug, Default)]
pub struct ChunkBuilder {
    instructions: Vec<Instruction>,
    /// Indices of the `LoopStart`s that are still open.
    loop_stack: Vec<usize>,
    /// Pointer movement since the last loop boundary.
    pending_offset: isize,
    finalized: bool,
    flags: OptimisationsFlags,
}

impl ChunkBuilder {
    pub fn new() -> Self {
        Self::with_optimisations(OptimisationsFlags::all())
    }

    pub fn with_optimisations(flags: OptimisationsFlags) -> Self {
        ChunkBuilder {
            flags,
            ..ChunkBuilder::default()
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn pending_offset(&self) -> isize {
        self.pending_offset
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn can_finalize(&self) -> bool {
        self.loop_stack.is_empty()
    }

    pub fn change_value(&mut self, delta: Cell) -> Result<(), BuildError> {
        self.assert_not_finalized()?;
        self.optimized_push(ChangeValue {
            delta,
            offset: self.pending_offset,
        })
    }

    pub fn set_value(&mut self, value: Cell) -> Result<(), BuildError> {
        self.assert_not_finalized()?;
        self.optimized_push(SetAbsolute {
            value,
            offset: self.pending_offset,
        })
    }

    pub fn change_pointer(&mut self, delta: isize) -> Result<(), BuildError> {
        self.assert_not_finalized()?;
        self.pending_offset += delta;
        Ok(())
    }

    pub fn input_byte(&mut self) -> Result<(), BuildError> {
        self.assert_not_finalized()?;
        self.optimized_push(InputByte {
            offset: self.pending_offset,
        })
    }

    pub fn output_byte(&mut self) -> Result<(), BuildError> {
        self.assert_not_finalized()?;
        self.instructions.push(OutputByte {
            offset: self.pending_offset,
        });
        Ok(())
    }

    pub fn start_loop(&mut self) -> Result<(), BuildError> {
        self.assert_not_finalized()?;
        self.loop_stack.push(self.instructions.len());
        self.instructions.push(LoopStart {
            offset: self.pending_offset,
        });
        self.pending_offset = 0;
        Ok(())
    }

    pub fn end_loop(&mut self) -> Result<LoopRewrite, BuildError> {
        self.assert_not_finalized()?;
        let start = self.loop_stack.pop().ok_or(BuildError::UnmatchedLoopEnd)?;
        let entry_offset = self.instructions[start].offset();

        if self.flags.contains(OptimisationsFlags::DEAD_LOOPS) && self.is_dead_loop(start) {
            log::trace!("removing dead loop at instruction {}", start);
            self.instructions.truncate(start);
            self.pending_offset = entry_offset;
            return Ok(LoopRewrite::Removed);
        }

        if self.flags.contains(OptimisationsFlags::CLEAR_LOOPS) && self.is_clear_loop(start) {
            log::trace!("rewriting clear loop at instruction {}", start);
            self.instructions.truncate(start);
            self.pending_offset = entry_offset;
            self.optimized_push(SetAbsolute {
                value: Wrapping(0),
                offset: entry_offset,
            })?;
            return Ok(LoopRewrite::Cleared);
        }

        self.instructions.push(LoopEnd {
            offset: self.pending_offset,
        });
        self.pending_offset = 0;
        Ok(LoopRewrite::Kept)
    }

    /// Hand the instructions over as an immutable chunk. Any later call on
    /// this builder fails with `AlreadyFinalized`.
    pub fn finalize(&mut self) -> Result<Chunk, BuildError> {
        self.assert_not_finalized()?;
        if !self.can_finalize() {
            return Err(BuildError::UnclosedLoop);
        }

        self.finalized = true;
        Ok(Chunk::new(std::mem::take(&mut self.instructions)))
    }

    fn assert_not_finalized(&self) -> Result<(), BuildError> {
        if self.finalized {
            Err(BuildError::AlreadyFinalized)
        } else {
            Ok(())
        }
    }

    fn pop(&mut self) -> Result<Instruction, BuildError> {
        self.instructions.pop().ok_or(BuildError::EmptyPop)
    }

    /// The last instruction, if it touches the same cell as `offset`.
    /// Loop delimiters move the pointer, so nothing before them can match.
    fn last_at(&self, offset: isize) -> Option<Instruction> {
        self.instructions
            .last()
            .copied()
            .filter(|last| !last.is_loop_delimiter() && last.offset() == offset)
    }

    fn optimized_push(&mut self, instr: Instruction) -> Result<(), BuildError> {
        let offset = instr.offset();
        match instr {
            ChangeValue { delta, .. }
                if self.flags.contains(OptimisationsFlags::COMBINE_CHANGES) =>
            {
                if let Some(prev) = self.last_at(offset).filter(Instruction::can_merge) {
                    self.pop()?;
                    if let Some(merged) = prev.merge_change(delta) {
                        self.instructions.push(merged);
                    }
                    return Ok(());
                }
            }
            SetAbsolute { .. } | InputByte { .. }
                if self.flags.contains(OptimisationsFlags::DEAD_STORES) =>
            {
                while self.last_at(offset).map_or(false, |prev| prev.can_merge()) {
                    self.pop()?;
                }
            }
            _ => {}
        }

        self.instructions.push(instr);
        Ok(())
    }

    /// Is the cell tested by the loop starting at `start` already zero?
    ///
    /// All cells start at zero, so a loop before any other instruction
    /// never runs. A loop only exits once its cell is zero, so a loop
    /// directly after another loop on the same cell never runs either. The
    /// same holds after a clear.
    fn is_dead_loop(&self, start: usize) -> bool {
        if start == 0 {
            return true;
        }

        let entry_offset = self.instructions[start].offset();
        let prev = &self.instructions[start - 1];
        match prev {
            LoopEnd { .. } => entry_offset == 0,
            SetAbsolute { .. } => prev.is_clear() && prev.offset() == entry_offset,
            _ => false,
        }
    }

    /// A loop whose whole body is a single change to the cell it tests,
    /// with no net pointer movement, runs until that cell is zero.
    fn is_clear_loop(&self, start: usize) -> bool {
        if self.pending_offset != 0 {
            return false;
        }

        match &self.instructions[start + 1..] {
            [ChangeValue { delta, offset: 0 }] => *delta != Wrapping(0),
            _ => false,
        }
    }
}

/// Run the peephole optimisations over an existing chunk by replaying it
/// through a fresh builder. Optimising an optimized chunk is a no-op.
pub fn optimize(chunk: &Chunk, flags: OptimisationsFlags) -> Result<Chunk, BuildError> {
    let mut builder = ChunkBuilder::with_optimisations(flags);
    // Offsets in `chunk` are relative to the last delimiter it contains. A
    // loop the builder removes or clears leaves the pointer where that
    // loop was entered, so later offsets must be shifted by that amount.
    let mut base = 0;

    for instr in chunk {
        builder.pending_offset = base + instr.offset();
        match *instr {
            ChangeValue { delta, .. } => builder.change_value(delta)?,
            SetAbsolute { value, .. } => builder.set_value(value)?,
            InputByte { .. } => builder.input_byte()?,
            OutputByte { .. } => builder.output_byte()?,
            LoopStart { .. } => {
                builder.start_loop()?;
                base = 0;
            }
            LoopEnd { .. } => {
                builder.end_loop()?;
                base = builder.pending_offset;
            }
        }
    }

    builder.finalize()
}
