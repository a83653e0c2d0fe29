//! Bytecode interpreter
//!
//! The execution engine. For every slice of the shard, and for every
//! quadword offset at the plan's initial rank, the sealed program runs
//! once: row loads fetch quadwords at `row_offset + (offset >> delta)`,
//! the boolean operators combine them in the accumulator and value stack,
//! and `Report` folds nonzero accumulators into the per-iteration dedupe
//! map. When an iteration reported anything, the dedupe map drains into
//! the results buffer as (slice, document index) pairs.
//!
//! The inner loop does no allocation, no locking, and no I/O. All
//! recoverable validation happened at generation time; the failures left
//! here (undefined opcode, stack underflow, dedupe overflow) are logic
//! bugs and panic.

use std::io::Write;

use crate::diag::DiagnosticStream;
use crate::index::shard::Slice;
use crate::index::BITS_PER_QUADWORD;
use crate::matcher::bytecode::{ByteCodeGenerator, Instruction, Opcode};
use crate::matcher::cache_lines::CacheLineRecorder;
use crate::matcher::instrumentation::QueryInstrumentation;
use crate::matcher::results::ResultsBuffer;

// Header quadword plus one accumulator slot per sub-iteration offset.
const DEDUPE_WORDS: usize = BITS_PER_QUADWORD + 1;

pub struct ByteCodeInterpreter<'a> {
    code: &'a [Instruction],
    jump_table: &'a [usize],
    results: &'a mut ResultsBuffer,
    slices: &'a [Slice],
    iterations_per_slice: usize,
    row_offsets: &'a [usize],

    // Machine state.
    offset: usize,
    accumulator: u64,
    zero_flag: bool,
    value_stack: Vec<u64>,
    call_stack: Vec<usize>,
    dedupe: [u64; DEDUPE_WORDS],

    instrumentation: &'a mut QueryInstrumentation,
    diagnostic: Option<&'a mut DiagnosticStream>,
    cache_lines: Option<CacheLineRecorder>,
}

impl<'a> ByteCodeInterpreter<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        code: &'a ByteCodeGenerator,
        results: &'a mut ResultsBuffer,
        slices: &'a [Slice],
        iterations_per_slice: usize,
        row_offsets: &'a [usize],
        diagnostic: Option<&'a mut DiagnosticStream>,
        instrumentation: &'a mut QueryInstrumentation,
        cache_lines: Option<CacheLineRecorder>,
    ) -> Self {
        Self {
            code: code.code(),
            jump_table: code.jump_table(),
            results,
            slices,
            iterations_per_slice,
            row_offsets,
            offset: 0,
            accumulator: 0,
            zero_flag: false,
            value_stack: Vec::with_capacity(16),
            call_stack: Vec::with_capacity(16),
            dedupe: [0; DEDUPE_WORDS],
            instrumentation,
            diagnostic,
            cache_lines,
        }
    }

    /// Run the program over every slice. Returns true when a results
    /// processor requested early termination (none does today; the hook
    /// always answers "continue").
    pub fn run(&mut self) -> bool {
        for slice in 0..self.slices.len() {
            if self.process_one_slice(slice) {
                return true;
            }
        }
        false
    }

    fn process_one_slice(&mut self, slice: usize) -> bool {
        if let Some(recorder) = &mut self.cache_lines {
            recorder.reset();
        }

        for iteration in 0..self.iterations_per_slice {
            if self.run_one_iteration(slice, iteration) {
                break;
            }
        }

        if let Some(recorder) = &self.cache_lines {
            self.instrumentation
                .increment_cache_line_count(recorder.cache_lines_accessed());
        }
        false
    }

    fn run_one_iteration(&mut self, slice: usize, iteration: usize) -> bool {
        let slices = self.slices;
        let buffer = slices[slice].buffer();
        let mut ip = 0usize;
        let mut called_add_result = false;

        self.offset = iteration;
        // AND identity, so a plan whose root is pure stack-machine code
        // (for example a lone Not under Report) starts from the full
        // column instead of an empty one.
        self.accumulator = u64::MAX;
        self.zero_flag = false;

        if let Some(diag) = self.diagnostic.as_deref_mut() {
            if diag.is_enabled("bytecode/opcode") {
                let _ = writeln!(diag.stream(), "--------------------");
                let _ = writeln!(diag.stream(), "slice {} iteration {}:", slice, iteration);
            }
        }

        loop {
            let instruction = self.code[ip];
            let opcode = instruction.opcode();
            if opcode == Opcode::End {
                break;
            }

            if let Some(diag) = self.diagnostic.as_deref_mut() {
                if diag.is_enabled("bytecode/opcode") {
                    let zero_flag = self.zero_flag;
                    let _ = writeln!(
                        diag.stream(),
                        "ip {:<3} {:?} offset={} zf={}",
                        ip,
                        instruction,
                        self.offset,
                        zero_flag
                    );
                }
            }

            match opcode {
                Opcode::AndRow => {
                    self.instrumentation.increment_quadword_count();
                    let word_offset = self.row_offsets[instruction.row()]
                        + (self.offset >> instruction.delta());
                    if let Some(recorder) = &mut self.cache_lines {
                        recorder.record_access(word_offset);
                    }
                    let value = buffer[word_offset];
                    self.accumulator &= if instruction.inverted() { !value } else { value };
                    self.zero_flag = self.accumulator == 0;
                    ip += 1;
                    self.trace_row_load("AndRow");
                }
                Opcode::LoadRow => {
                    self.instrumentation.increment_quadword_count();
                    let word_offset = self.row_offsets[instruction.row()]
                        + (self.offset >> instruction.delta());
                    if let Some(recorder) = &mut self.cache_lines {
                        recorder.record_access(word_offset);
                    }
                    let value = buffer[word_offset];
                    self.accumulator = if instruction.inverted() { !value } else { value };
                    self.zero_flag = self.accumulator == 0;
                    ip += 1;
                    self.trace_row_load("LoadRow");
                }
                Opcode::LeftShiftOffset => {
                    self.offset <<= instruction.row();
                    ip += 1;
                }
                Opcode::RightShiftOffset => {
                    self.offset >>= instruction.row();
                    ip += 1;
                }
                Opcode::IncrementOffset => {
                    self.offset += 1;
                    ip += 1;
                }
                Opcode::Push => {
                    self.value_stack.push(self.accumulator);
                    ip += 1;
                }
                Opcode::Pop => {
                    self.accumulator = self.value_stack.pop().expect("value stack underflow");
                    ip += 1;
                }
                Opcode::AndStack => {
                    let top = self.value_stack.pop().expect("value stack underflow");
                    self.accumulator &= top;
                    ip += 1;
                }
                Opcode::Constant => {
                    panic!("Constant opcode not implemented");
                }
                Opcode::Not => {
                    self.accumulator = !self.accumulator;
                    ip += 1;
                }
                Opcode::OrStack => {
                    let top = self.value_stack.pop().expect("value stack underflow");
                    self.accumulator |= top;
                    ip += 1;
                }
                Opcode::UpdateFlags => {
                    let top = *self.value_stack.last().expect("value stack underflow");
                    self.zero_flag = top == 0;
                    ip += 1;
                }
                Opcode::Report => {
                    if self.accumulator != 0 {
                        self.add_result(self.accumulator, self.offset);
                        called_add_result = true;
                    }
                    ip += 1;
                }
                Opcode::Call => {
                    self.call_stack.push(ip + 1);
                    ip = self.jump_table[instruction.row()];
                }
                Opcode::Jmp => {
                    ip = self.jump_table[instruction.row()];
                }
                Opcode::Jnz => {
                    ip = if self.accumulator != 0 {
                        self.jump_table[instruction.row()]
                    } else {
                        ip + 1
                    };
                }
                Opcode::Jz => {
                    ip = if self.accumulator == 0 {
                        self.jump_table[instruction.row()]
                    } else {
                        ip + 1
                    };
                }
                Opcode::Return => {
                    ip = self.call_stack.pop().expect("call stack underflow");
                }
                Opcode::End => unreachable!("handled above"),
            }
        }

        if called_add_result {
            self.finish_iteration(slice)
        } else {
            false
        }
    }

    /// Fold a nonzero accumulator into the dedupe map. Bit `offset` of the
    /// header marks slot `offset + 1` live; the slot OR-merges
    /// accumulators from multiple Report paths at the same offset.
    fn add_result(&mut self, accumulator: u64, offset: usize) {
        debug_assert!(
            offset < BITS_PER_QUADWORD,
            "dedupe offset {} overflows the header bitmap",
            offset
        );
        self.dedupe[0] |= 1u64 << offset;
        self.dedupe[offset + 1] |= accumulator;
    }

    /// Drain the dedupe map into the results buffer. Returns the early
    /// termination answer of the results processor protocol.
    fn finish_iteration(&mut self, slice: usize) -> bool {
        let slice_id = self.slices[slice].id();

        let mut map = self.dedupe[0];
        while map != 0 {
            let offset = map.trailing_zeros() as usize;

            let mut accumulator = self.dedupe[offset + 1];
            while accumulator != 0 {
                let bit = accumulator.trailing_zeros() as usize;
                let doc_index = offset * BITS_PER_QUADWORD + bit;
                self.results.push(slice_id, doc_index);
                accumulator &= accumulator - 1;
            }
            self.dedupe[offset + 1] = 0;
            map &= map - 1;
        }
        self.dedupe[0] = 0;

        false
    }

    fn trace_row_load(&mut self, name: &str) {
        if let Some(diag) = self.diagnostic.as_deref_mut() {
            if diag.is_enabled("bytecode/loadrow") {
                let accumulator = self.accumulator;
                let _ = writeln!(diag.stream(), "{}: {:016x}", name, accumulator);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
