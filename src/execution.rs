//! The bytecode virtual machine.

use crate::bytecode::{Bytecode, Opcode, Word};
use std::convert::TryFrom;
use std::io::{self, Read, Write};
use thiserror::Error;

#[cfg(test)]
use crate::bytecode::compile;
#[cfg(test)]
use crate::parser::{parse, parse_with};
#[cfg(test)]
use crate::peephole::OptimisationsFlags;
#[cfg(test)]
use pretty_assertions::assert_eq;

pub const DEFAULT_TAPE_SIZE: usize = 30_000;
pub const DEFAULT_FLUSH_THRESHOLD: usize = 50;

/// What `,` does once the input stream has no more bytes.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EofPolicy {
    /// Store this value in the cell and carry on.
    Sentinel(u8),
    /// Halt with `RuntimeError::InputExhausted`.
    Fail,
}

impl Default for EofPolicy {
    fn default() -> Self {
        EofPolicy::Sentinel(0)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Settings {
    pub tape_size: usize,
    /// Output is written to the sink once more than this many bytes are
    /// buffered.
    pub flush_threshold: usize,
    pub eof: EofPolicy,
    pub step_limit: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            tape_size: DEFAULT_TAPE_SIZE,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            eof: EofPolicy::default(),
            step_limit: None,
        }
    }
}

impl Settings {
    pub fn with_tape_size(mut self, tape_size: usize) -> Self {
        self.tape_size = tape_size;
        self
    }

    pub fn with_flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = flush_threshold;
        self
    }

    pub fn with_eof(mut self, eof: EofPolicy) -> Self {
        self.eof = eof;
        self
    }

    pub fn with_step_limit(mut self, step_limit: Option<u64>) -> Self {
        self.step_limit = step_limit;
        self
    }
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("pointer moved outside the tape (cell {pointer})")]
    TapeOutOfBounds { pointer: isize },
    #[error("program read past the end of its input")]
    InputExhausted,
    #[error("program did not halt within {steps} steps")]
    StepLimitExceeded { steps: u64 },
    #[error("invalid opcode {word} at address {address}")]
    InvalidOpcode { address: usize, word: Word },
    #[error("jump at address {address} leaves the program")]
    InvalidJump { address: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RuntimeError {
    /// Errors that can only come from malformed bytecode, not from the
    /// program being run.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            RuntimeError::InvalidOpcode { .. } | RuntimeError::InvalidJump { .. }
        )
    }
}

/// Collects output bytes and writes them to `sink` in batches, in the
/// order they were produced.
pub struct OutputBuffer<W: Write> {
    buffer: Vec<u8>,
    sink: W,
    threshold: usize,
}

impl<W: Write> OutputBuffer<W> {
    pub fn new(sink: W, threshold: usize) -> Self {
        OutputBuffer {
            buffer: Vec::with_capacity(threshold + 1),
            sink,
            threshold,
        }
    }

    pub fn push(&mut self, byte: u8) -> io::Result<()> {
        self.buffer.push(byte);
        if self.buffer.len() > self.threshold {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            self.sink.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        self.sink.flush()
    }

    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// The machine state left behind by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionState {
    pub tape: Vec<u8>,
    pub pointer: usize,
    pub program_counter: usize,
    /// Number of bytecode instructions executed.
    pub steps: u64,
}

impl ExecutionState {
    fn new(tape_size: usize) -> Self {
        ExecutionState {
            tape: vec![0; tape_size],
            pointer: 0,
            program_counter: 0,
            steps: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

struct Machine<'a, R: Read, W: Write> {
    code: &'a [Word],
    state: ExecutionState,
    input: R,
    output: OutputBuffer<W>,
    settings: Settings,
}

impl<'a, R: Read, W: Write> Machine<'a, R, W> {
    /// Resolve `pointer + offset` to a tape index, or fail if it leaves
    /// the tape.
    fn cell(&self, offset: Word) -> Result<usize, RuntimeError> {
        let pointer = self.state.pointer as isize;
        let target = pointer
            .checked_add(offset)
            .ok_or(RuntimeError::TapeOutOfBounds {
                pointer: pointer.saturating_add(offset),
            })?;
        if target < 0 || target as usize >= self.state.tape.len() {
            return Err(RuntimeError::TapeOutOfBounds { pointer: target });
        }
        Ok(target as usize)
    }

    fn operand(&self, index: usize) -> Word {
        self.code[self.state.program_counter + index]
    }

    fn read_byte(&mut self) -> Result<Option<u8>, RuntimeError> {
        // Anything the program printed so far should be visible before we
        // block waiting for input.
        self.output.flush()?;

        let mut byte = [0u8];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn run(&mut self) -> Result<(), RuntimeError> {
        while self.state.program_counter < self.code.len() {
            if let Some(limit) = self.settings.step_limit {
                if self.state.steps >= limit {
                    return Err(RuntimeError::StepLimitExceeded { steps: limit });
                }
            }
            self.step()?;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<(), RuntimeError> {
        let pc = self.state.program_counter;
        let opcode = Opcode::try_from(self.code[pc])
            .map_err(|word| RuntimeError::InvalidOpcode { address: pc, word })?;
        if pc + opcode.width() > self.code.len() {
            return Err(RuntimeError::InvalidOpcode {
                address: pc,
                word: self.code[pc],
            });
        }
        self.state.steps += 1;

        let offset = self.operand(1);
        match opcode {
            Opcode::ChangeValue => {
                let cell = self.cell(offset)?;
                let amount = self.operand(2) as u8;
                self.state.tape[cell] = self.state.tape[cell].wrapping_add(amount);
            }
            Opcode::SetAbsolute => {
                let cell = self.cell(offset)?;
                self.state.tape[cell] = self.operand(2) as u8;
            }
            Opcode::InputByte => {
                let cell = self.cell(offset)?;
                self.state.tape[cell] = match self.read_byte()? {
                    Some(byte) => byte,
                    None => match self.settings.eof {
                        EofPolicy::Sentinel(value) => value,
                        EofPolicy::Fail => return Err(RuntimeError::InputExhausted),
                    },
                };
            }
            Opcode::OutputByte => {
                let cell = self.cell(offset)?;
                self.output.push(self.state.tape[cell])?;
            }
            Opcode::JumpIfZero => {
                self.state.pointer = self.cell(offset)?;
                if self.state.tape[self.state.pointer] == 0 {
                    return self.jump(Direction::Forward, self.operand(2));
                }
            }
            Opcode::JumpIfNotZero => {
                self.state.pointer = self.cell(offset)?;
                if self.state.tape[self.state.pointer] != 0 {
                    return self.jump(Direction::Backward, self.operand(2));
                }
            }
        }

        self.state.program_counter += opcode.width();
        Ok(())
    }

    /// Continue `distance` words before or after the end of the current
    /// jump instruction.
    fn jump(&mut self, direction: Direction, distance: Word) -> Result<(), RuntimeError> {
        let pc = self.state.program_counter;
        let next = (pc + Opcode::JumpIfZero.width()) as isize;
        let target = match direction {
            Direction::Forward => next.checked_add(distance),
            Direction::Backward => next.checked_sub(distance),
        };
        match target {
            Some(target) if target >= 0 && target as usize <= self.code.len() => {
                self.state.program_counter = target as usize;
                Ok(())
            }
            _ => Err(RuntimeError::InvalidJump { address: pc }),
        }
    }
}

/// Run `bytecode` to completion, reading `,` from `input` and writing `.`
/// to `output`. Buffered output is flushed however execution ends.
pub fn execute<R: Read, W: Write>(
    bytecode: &Bytecode,
    input: R,
    output: W,
    settings: Settings,
) -> Result<ExecutionState, RuntimeError> {
    let mut machine = Machine {
        code: bytecode.words(),
        state: ExecutionState::new(settings.tape_size),
        output: OutputBuffer::new(output, settings.flush_threshold),
        input,
        settings,
    };

    let result = machine.run();
    let flushed = machine.output.flush();
    log::trace!(
        "halted at pc {} after {} steps",
        machine.state.program_counter,
        machine.state.steps
    );

    result?;
    flushed?;
    Ok(machine.state)
}

#[cfg(test)]
fn run_with(
    source: &str,
    input: &[u8],
    settings: Settings,
) -> Result<(Vec<u8>, ExecutionState), RuntimeError> {
    let bytecode = compile(&parse(source.as_bytes()).unwrap()).unwrap();
    let mut output: Vec<u8> = vec![];
    let state = execute(&bytecode, input, &mut output, settings)?;
    Ok((output, state))
}

#[cfg(test)]
fn run(source: &str, input: &[u8]) -> Vec<u8> {
    run_with(source, input, Settings::default()).unwrap().0
}

#[test]
fn execute_prints_value() {
    assert_eq!(run("+++.", b""), vec![3]);
}

#[test]
fn execute_hello_world() {
    let source = "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";
    assert_eq!(run(source, b""), b"Hello World!\n".to_vec());
}

#[test]
fn execute_wraps_cells() {
    let (_, state) = run_with("-", b"", Settings::default()).unwrap();
    assert_eq!(state.tape[0], 255);

    let (_, state) = run_with("-+", b"", Settings::default()).unwrap();
    assert_eq!(state.tape[0], 0);
}

#[test]
fn execute_echo() {
    assert_eq!(run(",[.,]", b"abc"), b"abc".to_vec());
}

#[test]
fn execute_eof_sentinel() {
    let settings = Settings::default().with_eof(EofPolicy::Sentinel(255));
    let (output, _) = run_with(",.", b"", settings).unwrap();
    assert_eq!(output, vec![255]);

    let (output, _) = run_with(",.", b"", Settings::default()).unwrap();
    assert_eq!(output, vec![0]);
}

#[test]
fn execute_eof_fail() {
    let settings = Settings::default().with_eof(EofPolicy::Fail);
    match run_with(",.", b"", settings) {
        Err(RuntimeError::InputExhausted) => {}
        other => panic!("expected InputExhausted, got {:?}", other),
    }
}

#[test]
fn execute_left_of_tape() {
    match run_with("<+", b"", Settings::default()) {
        Err(RuntimeError::TapeOutOfBounds { pointer: -1 }) => {}
        other => panic!("expected TapeOutOfBounds, got {:?}", other),
    }
}

#[test]
fn execute_right_of_tape() {
    let settings = Settings::default().with_tape_size(4);
    match run_with("+[>+]", b"", settings) {
        Err(RuntimeError::TapeOutOfBounds { pointer: 4 }) => {}
        other => panic!("expected TapeOutOfBounds, got {:?}", other),
    }
}

#[test]
fn execute_flushes_on_error() {
    let bytecode = compile(&parse(b"+.<+").unwrap()).unwrap();
    let mut output: Vec<u8> = vec![];
    let result = execute(&bytecode, &b""[..], &mut output, Settings::default());
    assert!(result.is_err());
    assert_eq!(output, vec![1]);
}

#[test]
fn execute_step_limit() {
    let settings = Settings::default().with_step_limit(Some(100));
    match run_with("+[]", b"", settings) {
        Err(RuntimeError::StepLimitExceeded { steps: 100 }) => {}
        other => panic!("expected StepLimitExceeded, got {:?}", other),
    }
}

#[test]
fn execute_clear_loop_is_cheaper() {
    let source = b"+++++[-]";
    let optimized = compile(&parse(source).unwrap()).unwrap();
    let (chunk, _) = parse_with(source, OptimisationsFlags::empty()).unwrap();
    let unoptimized = compile(&chunk).unwrap();

    let fast = execute(&optimized, &b""[..], io::sink(), Settings::default()).unwrap();
    let slow = execute(&unoptimized, &b""[..], io::sink(), Settings::default()).unwrap();
    assert_eq!(fast.tape[0], 0);
    assert_eq!(slow.tape[0], 0);
    assert!(fast.steps < slow.steps);
}

#[test]
fn execute_invalid_jump() {
    let bytecode = Bytecode::from_words(vec![3, 0, 1, 6, 0, 50]);
    match execute(&bytecode, &b""[..], io::sink(), Settings::default()) {
        Err(e @ RuntimeError::InvalidJump { address: 3 }) => assert!(e.is_internal()),
        other => panic!("expected InvalidJump, got {:?}", other),
    }
}

#[test]
fn execute_jump_distance_overflow() {
    let programs = [
        vec![3, 0, 1, 6, 0, isize::MIN],
        vec![3, 0, 1, 6, 0, isize::MAX],
        vec![5, 0, isize::MAX],
    ];
    for words in programs.iter() {
        let bytecode = Bytecode::from_words(words.clone());
        match execute(&bytecode, &b""[..], io::sink(), Settings::default()) {
            Err(RuntimeError::InvalidJump { .. }) => {}
            other => panic!("expected InvalidJump, got {:?}", other),
        }
    }
}

#[test]
fn execute_offset_overflow() {
    // The jump moves the pointer to cell 1 and falls through, so the
    // change addresses a cell past isize::MAX.
    let bytecode = Bytecode::from_words(vec![5, 1, 0, 3, isize::MAX, 1]);
    match execute(&bytecode, &b""[..], io::sink(), Settings::default()) {
        Err(RuntimeError::TapeOutOfBounds { pointer }) => assert_eq!(pointer, isize::MAX),
        other => panic!("expected TapeOutOfBounds, got {:?}", other),
    }
}

#[test]
fn execute_flushes_before_input() {
    use std::cell::RefCell;
    use std::rc::Rc;

    struct SharedSink(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Records what the sink held when the program first asked for input.
    struct WatchingInput {
        sink: Rc<RefCell<Vec<u8>>>,
        seen: Option<Vec<u8>>,
    }

    impl Read for WatchingInput {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.seen.is_none() {
                self.seen = Some(self.sink.borrow().clone());
            }
            buf[0] = b'x';
            Ok(1)
        }
    }

    let sink = Rc::new(RefCell::new(vec![]));
    let mut input = WatchingInput {
        sink: Rc::clone(&sink),
        seen: None,
    };
    let bytecode = compile(&parse(b"+++.,.").unwrap()).unwrap();
    execute(
        &bytecode,
        &mut input,
        SharedSink(Rc::clone(&sink)),
        Settings::default(),
    )
    .unwrap();

    assert_eq!(input.seen, Some(vec![3]));
    assert_eq!(*sink.borrow(), vec![3, b'x']);
}

#[test]
fn execute_invalid_opcode() {
    let bytecode = Bytecode::from_words(vec![9, 0]);
    match execute(&bytecode, &b""[..], io::sink(), Settings::default()) {
        Err(e @ RuntimeError::InvalidOpcode { address: 0, word: 9 }) => assert!(e.is_internal()),
        other => panic!("expected InvalidOpcode, got {:?}", other),
    }
}

#[test]
fn output_buffer_batches() {
    let mut buffer = OutputBuffer::new(Vec::<u8>::new(), 2);
    buffer.push(b'a').unwrap();
    buffer.push(b'b').unwrap();
    assert_eq!(buffer.pending(), b"ab");

    buffer.push(b'c').unwrap();
    assert!(buffer.pending().is_empty());
    buffer.push(b'd').unwrap();
    buffer.flush().unwrap();
    assert_eq!(buffer.into_inner(), b"abcd".to_vec());
}

#[test]
fn separate_runs_do_not_share_output() {
    assert_eq!(run("+.", b""), vec![1]);
    assert_eq!(run("++.", b""), vec![2]);
}
