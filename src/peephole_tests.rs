use crate::instruction::Instruction::{self, *};
use crate::parser::{parse, parse_with};
use crate::peephole::{optimize, BuildError, ChunkBuilder, LoopRewrite, OptimisationsFlags};
use pretty_assertions::assert_eq;
use std::num::Wrapping;

fn optimized(source: &str) -> Vec<Instruction> {
    parse(source.as_bytes()).unwrap().instructions().to_vec()
}

fn change(delta: i8, offset: isize) -> Instruction {
    ChangeValue {
        delta: Wrapping(delta),
        offset,
    }
}

fn set(value: i8, offset: isize) -> Instruction {
    SetAbsolute {
        value: Wrapping(value),
        offset,
    }
}

#[test]
fn combine_changes() {
    assert_eq!(optimized("+++--+"), vec![change(2, 0)]);
}

#[test]
fn combine_changes_to_zero() {
    assert!(optimized("++--").is_empty());
    assert_eq!(optimized(".+-"), vec![OutputByte { offset: 0 }]);
}

#[test]
fn no_combine_across_cells() {
    assert_eq!(
        optimized("+>+<+"),
        vec![change(1, 0), change(1, 1), change(1, 0)]
    );
}

#[test]
fn pointer_moves_fold_into_offsets() {
    assert!(optimized("><").is_empty());
    assert_eq!(
        optimized(">>>.<<,"),
        vec![OutputByte { offset: 3 }, InputByte { offset: 1 }]
    );
}

#[test]
fn outputs_are_never_merged() {
    assert_eq!(
        optimized("+..+"),
        vec![
            change(1, 0),
            OutputByte { offset: 0 },
            OutputByte { offset: 0 },
            change(1, 0)
        ]
    );
}

#[test]
fn input_overwrites_pending_writes() {
    assert_eq!(optimized("+++,"), vec![InputByte { offset: 0 }]);
    assert_eq!(optimized("+[-]+,"), vec![InputByte { offset: 0 }]);
}

#[test]
fn input_keeps_previous_input() {
    assert_eq!(
        optimized(",,"),
        vec![InputByte { offset: 0 }, InputByte { offset: 0 }]
    );
}

#[test]
fn input_keeps_writes_to_other_cells() {
    assert_eq!(
        optimized("+>,"),
        vec![change(1, 0), InputByte { offset: 1 }]
    );
}

#[test]
fn clear_loop() {
    assert_eq!(optimized("+++++[-]"), vec![set(0, 0)]);
}

#[test]
fn clear_loop_with_increment() {
    assert_eq!(optimized(",[+]"), vec![InputByte { offset: 0 }, set(0, 0)]);
}

#[test]
fn clear_loop_keeps_entry_offset() {
    assert_eq!(
        optimized(",>>[-]+."),
        vec![InputByte { offset: 0 }, set(1, 2), OutputByte { offset: 2 }]
    );
}

#[test]
fn clear_loop_needs_offset_zero() {
    assert_eq!(
        optimized(",[>-<]"),
        vec![
            InputByte { offset: 0 },
            LoopStart { offset: 0 },
            change(-1, 1),
            LoopEnd { offset: 0 }
        ]
    );
}

#[test]
fn clear_loop_needs_balanced_pointer() {
    assert_eq!(
        optimized(",[->]"),
        vec![
            InputByte { offset: 0 },
            LoopStart { offset: 0 },
            change(-1, 0),
            LoopEnd { offset: 1 }
        ]
    );
}

#[test]
fn set_absorbs_changes() {
    assert_eq!(optimized(",[-]+++"), vec![InputByte { offset: 0 }, set(3, 0)]);
}

#[test]
fn dead_loop_at_start() {
    assert_eq!(optimized("[+>.<]+"), vec![change(1, 0)]);
    assert_eq!(optimized(">>[-]."), vec![OutputByte { offset: 2 }]);
}

#[test]
fn dead_loop_after_loop() {
    assert_eq!(
        optimized(",[.,][.]"),
        vec![
            InputByte { offset: 0 },
            LoopStart { offset: 0 },
            OutputByte { offset: 0 },
            InputByte { offset: 0 },
            LoopEnd { offset: 0 }
        ]
    );
}

#[test]
fn loop_after_loop_on_other_cell_is_kept() {
    assert_eq!(
        optimized(",[.,]>[.]"),
        vec![
            InputByte { offset: 0 },
            LoopStart { offset: 0 },
            OutputByte { offset: 0 },
            InputByte { offset: 0 },
            LoopEnd { offset: 0 },
            LoopStart { offset: 1 },
            OutputByte { offset: 0 },
            LoopEnd { offset: 0 }
        ]
    );
}

#[test]
fn dead_loop_after_clear() {
    assert_eq!(
        optimized(",[-][.]."),
        vec![InputByte { offset: 0 }, set(0, 0), OutputByte { offset: 0 }]
    );
}

#[test]
fn dead_loop_restores_offset() {
    assert_eq!(optimized(">>[.]<+"), vec![change(1, 1)]);
    assert_eq!(
        optimized(",>>[-][.]<+"),
        vec![InputByte { offset: 0 }, set(0, 2), change(1, 1)]
    );
}

#[test]
fn loop_after_clear_on_other_cell_is_kept() {
    assert_eq!(
        optimized(",[-]>>[<.>]+"),
        vec![
            InputByte { offset: 0 },
            set(0, 0),
            LoopStart { offset: 2 },
            OutputByte { offset: -1 },
            LoopEnd { offset: 0 },
            change(1, 0)
        ]
    );
}

#[test]
fn nested_dead_loops() {
    assert!(optimized("[[[-]]]").is_empty());
}

#[test]
fn flags_disable_rewrites() {
    let (chunk, _) = parse_with(b"++[-]", OptimisationsFlags::CLEAR_LOOPS).unwrap();
    assert_eq!(chunk.instructions(), [change(1, 0), change(1, 0), set(0, 0)]);

    let (chunk, _) = parse_with(b"[-]", OptimisationsFlags::CLEAR_LOOPS).unwrap();
    assert_eq!(chunk.instructions(), [set(0, 0)]);

    let (chunk, warnings) = parse_with(b"[-]", OptimisationsFlags::DEAD_LOOPS).unwrap();
    assert!(chunk.is_empty());
    assert_eq!(warnings.len(), 1);
}

#[test]
fn builder_reports_rewrites() {
    let mut builder = ChunkBuilder::new();
    builder.start_loop().unwrap();
    assert_eq!(builder.end_loop(), Ok(LoopRewrite::Removed));

    builder.input_byte().unwrap();
    builder.start_loop().unwrap();
    builder.change_value(Wrapping(-1)).unwrap();
    assert_eq!(builder.end_loop(), Ok(LoopRewrite::Cleared));

    builder.change_pointer(1).unwrap();
    builder.input_byte().unwrap();
    builder.start_loop().unwrap();
    builder.output_byte().unwrap();
    assert_eq!(builder.end_loop(), Ok(LoopRewrite::Kept));
}

#[test]
fn builder_unclosed_loop() {
    let mut builder = ChunkBuilder::new();
    builder.start_loop().unwrap();
    assert!(!builder.can_finalize());
    assert_eq!(builder.finalize(), Err(BuildError::UnclosedLoop));
    assert!(!builder.is_finalized());
}

#[test]
fn builder_unmatched_end() {
    let mut builder = ChunkBuilder::new();
    assert_eq!(builder.end_loop(), Err(BuildError::UnmatchedLoopEnd));
}

#[test]
fn builder_rejects_use_after_finalize() {
    let mut builder = ChunkBuilder::new();
    builder.change_value(Wrapping(1)).unwrap();
    let chunk = builder.finalize().unwrap();
    assert_eq!(chunk.instructions(), [change(1, 0)]);
    assert!(builder.is_finalized());

    assert_eq!(
        builder.change_value(Wrapping(1)),
        Err(BuildError::AlreadyFinalized)
    );
    assert_eq!(builder.change_pointer(1), Err(BuildError::AlreadyFinalized));
    assert_eq!(builder.input_byte(), Err(BuildError::AlreadyFinalized));
    assert_eq!(builder.output_byte(), Err(BuildError::AlreadyFinalized));
    assert_eq!(builder.start_loop(), Err(BuildError::AlreadyFinalized));
    assert_eq!(builder.end_loop(), Err(BuildError::AlreadyFinalized));
    assert_eq!(builder.finalize(), Err(BuildError::AlreadyFinalized));
}

#[test]
fn optimize_is_a_fixpoint() {
    let sources = [
        "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.",
        ",[-]>>[<.>]+",
        ",[.,]>>[<.>]+",
        ",>>[-]+.<<[->+<]",
        "+[>[-]<-]>.",
    ];
    for source in sources.iter() {
        let chunk = parse(source.as_bytes()).unwrap();
        assert_eq!(optimize(&chunk, OptimisationsFlags::all()).unwrap(), chunk);
    }
}

#[test]
fn optimize_unoptimized_chunk() {
    let sources: [&[u8]; 3] = [b"++[-]>[.]>+", b">>[.]<+", b",>>[-][.]<+"];
    for source in sources.iter() {
        let (raw, _) = parse_with(source, OptimisationsFlags::empty()).unwrap();
        assert_eq!(
            optimize(&raw, OptimisationsFlags::all()).unwrap(),
            parse(source).unwrap()
        );
    }
}
