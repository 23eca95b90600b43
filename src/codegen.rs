//! Code generation: emit AT&T x86-64 assembly while the parser walks the
//! program.
//!
//! The emitter uses a simple stack machine: every expression leaves a single
//! 64-bit value on the machine stack and every operator pops its operands
//! from it. There is no register allocator; `%rax`/`%rbx` are scratch,
//! doubles go through the x87 stack and come back as 8-byte stack slots.
//! Globals are addressed relative to `%rip`.
//!
//! The generator tracks how many values sit on the evaluation stack so calls
//! can be aligned to 16 bytes from any point of an expression.

use snafu::OptionExt;

use crate::error::{
  ArgumentBudgetSnafu, CodegenResult, UnsupportedConversionSnafu, UnsupportedOperandSnafu,
  UnsupportedReturnSnafu,
};
use crate::symbols::Variable;
use crate::target::Target;
use crate::tokenizer::RelOp;
use crate::ty::{RegisterClass, Type};

pub const FORMAT_UNSIGNED: &str = "__cc_format_string_llu";
pub const FORMAT_CHAR: &str = "__cc_format_string_c";
pub const FORMAT_DOUBLE: &str = "__cc_format_string_f";

const INTEGER_ARGUMENT_REGISTERS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];
const FLOAT_ARGUMENT_REGISTERS: [&str; 8] = [
  "%xmm0", "%xmm1", "%xmm2", "%xmm3", "%xmm4", "%xmm5", "%xmm6", "%xmm7",
];

/// Hands out label tags. Tags are never reused within one compilation.
#[derive(Debug, Default)]
pub struct LabelAllocator {
  last: usize,
}

impl LabelAllocator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn allocate(&mut self) -> usize {
    self.last += 1;
    self.last
  }
}

#[derive(Debug)]
pub struct IfStatement {
  tag: usize,
}

#[derive(Debug)]
pub struct WhileStatement {
  tag: usize,
}

/// Loop tag plus the control variable the tail increments.
#[derive(Debug)]
pub struct ForStatement {
  tag: usize,
  variable: Variable,
}

/// State of one call site between `function_call_prepare` and
/// `function_call_finalize`.
#[derive(Debug)]
pub struct FunctionCall {
  name: String,
  return_type: Type,
  variadic: bool,
  integer_count: usize,
  float_count: usize,
}

impl FunctionCall {
  /// Next free argument register of `class`.
  fn register(&self, class: RegisterClass) -> CodegenResult<&'static str> {
    match class {
      RegisterClass::Integer => INTEGER_ARGUMENT_REGISTERS
        .get(self.integer_count)
        .copied()
        .context(ArgumentBudgetSnafu {
          class: "integer",
          limit: INTEGER_ARGUMENT_REGISTERS.len(),
        }),
      RegisterClass::Float => FLOAT_ARGUMENT_REGISTERS
        .get(self.float_count)
        .copied()
        .context(ArgumentBudgetSnafu {
          class: "floating point",
          limit: FLOAT_ARGUMENT_REGISTERS.len(),
        }),
    }
  }
}

pub struct CodeGen {
  asm: String,
  target: Target,
  labels: LabelAllocator,
  depth: i64,
}

impl CodeGen {
  pub fn new(target: Target) -> Self {
    Self {
      asm: String::new(),
      target,
      labels: LabelAllocator::new(),
      depth: 0,
    }
  }

  /// Assembly emitted so far.
  pub fn asm(&self) -> &str {
    &self.asm
  }

  pub fn finish(self) -> String {
    self.asm
  }

  /// Number of values currently on the evaluation stack.
  pub fn stack_depth(&self) -> i64 {
    self.depth
  }

  fn emit(&mut self, line: impl AsRef<str>) {
    self.asm.push_str(line.as_ref());
    self.asm.push('\n');
  }

  fn instr(&mut self, text: impl AsRef<str>) {
    self.asm.push_str("    ");
    self.emit(text);
  }

  fn push(&mut self, operand: &str) {
    self.instr(format!("pushq {operand}"));
    self.depth += 1;
  }

  fn pop(&mut self, operand: &str) {
    self.instr(format!("popq {operand}"));
    self.depth -= 1;
  }

  fn global(&self, variable: &Variable) -> String {
    format!("{}(%rip)", self.target.mangle(&variable.name))
  }

  pub fn begin_program(&mut self) {
    self.emit("# This code was generated by ceric");
  }

  pub fn begin_executable_section(&mut self) {
    self.emit(".text");
  }

  pub fn begin_main_procedure(&mut self) {
    let main = self.target.mangle("main");
    self.emit(format!(".globl {main}"));
    self.emit(format!("{main}:"));
    self.instr("pushq %rbp # Save the caller's base pointer");
    self.instr("movq %rsp, %rbp # Save the top of the stack");
  }

  pub fn finalize_main_procedure(&mut self) {
    self.instr("movq $0, %rax # Exit status");
    self.instr("movq %rbp, %rsp # Restore the top of the stack");
    self.instr("popq %rbp");
    self.instr("ret");
  }

  pub fn begin_global_data_section(&mut self) {
    self.emit(".data");
    self.emit(".align 8");
    self.emit(format!("{FORMAT_UNSIGNED}: .string \"%llu\\n\""));
    self.emit(format!(
      "{FORMAT_CHAR}: .string \"%c\" # No newline; this is intended"
    ));
    self.emit(format!("{FORMAT_DOUBLE}: .string \"%f\\n\""));
  }

  /// Zero-initialised datum as wide as the variable's type. Wide data is
  /// realigned since a narrow global may precede it.
  pub fn define_global_variable(&mut self, variable: &Variable) -> CodegenResult<()> {
    let ty = variable.ty;
    let size = ty.size();
    let directive = match size {
      1 => ".byte 0",
      8 if ty.is_floating() => ".double 0.0",
      8 => ".quad 0",
      _ => {
        return UnsupportedOperandSnafu {
          operation: "global variable",
          ty,
        }
        .fail();
      }
    };

    let name = self.target.mangle(&variable.name);
    if size > 1 {
      self.emit(format!(".align {size}"));
    }
    self.emit(format!("{name}:"));
    self.instr(format!("{directive} # type: {ty}"));
    Ok(())
  }

  /// Push the current value of a global. Narrow globals are widened so the
  /// stack always holds full 64-bit values: booleans are sign-extended to
  /// keep their all-ones encoding, characters are zero-extended.
  pub fn load_variable(&mut self, variable: &Variable) {
    let operand = self.global(variable);
    match variable.ty {
      Type::Boolean => {
        self.instr(format!("movsbq {operand}, %rax"));
        self.push("%rax");
      }
      Type::Char => {
        self.instr(format!("movzbq {operand}, %rax"));
        self.push("%rax");
      }
      _ => self.push(&operand),
    }
  }

  pub fn store_variable(&mut self, variable: &Variable) {
    let operand = self.global(variable);
    match variable.ty {
      Type::Boolean | Type::Char => {
        self.pop("%rax");
        self.instr(format!("movb %al, {operand}"));
      }
      _ => self.pop(&operand),
    }
  }

  /// Push a 64-bit literal. `pushq` only takes a sign-extended 32-bit
  /// immediate, anything wider goes through `%rax`.
  pub fn load_i64(&mut self, value: u64) {
    let signed = value as i64;
    if i32::try_from(signed).is_ok() {
      self.push(&format!("${signed}"));
    } else {
      self.instr(format!("movabsq $0x{value:016x}, %rax"));
      self.push("%rax");
    }
  }

  pub fn load_f64(&mut self, value: f64) {
    self.load_i64(value.to_bits());
  }

  pub fn load_pointer_to_variable(&mut self, variable: &Variable) {
    let operand = self.global(variable);
    self.instr(format!("leaq {operand}, %rax"));
    self.push("%rax");
  }

  /// Replace the pointer on top of the stack with the value it points to.
  pub fn load_value_from_pointer(&mut self, dereferenced: Type) {
    self.pop("%rax");
    match dereferenced {
      Type::Boolean => {
        self.instr("movsbq (%rax), %rax");
        self.push("%rax");
      }
      Type::Char => {
        self.instr("movzbq (%rax), %rax");
        self.push("%rax");
      }
      _ => self.push("(%rax)"),
    }
  }

  /// Pop a pointer, then the value to write through it.
  pub fn store_value_to_pointer(&mut self, value_type: Type) {
    self.pop("%rax");
    self.pop("%rbx");
    match value_type {
      Type::Boolean | Type::Char => self.instr("movb %bl, (%rax)"),
      _ => self.instr("movq %rbx, (%rax)"),
    }
  }

  fn alu_load_integer_operands(&mut self) {
    self.pop("%rbx");
    self.pop("%rax");
  }

  /// Leaves the left operand in `%st(0)` and the right one in `%st(1)`.
  fn alu_load_float_operands(&mut self) {
    self.instr("fldl (%rsp)");
    self.instr("fldl 8(%rsp)");
    self.instr("addq $16, %rsp");
    self.depth -= 2;
  }

  fn alu_store_f64(&mut self) {
    self.instr("subq $8, %rsp");
    self.instr("fstpl (%rsp)");
    self.depth += 1;
  }

  pub fn alu_and_bool(&mut self) {
    self.alu_load_integer_operands();
    self.instr("andq %rbx, %rax");
    self.push("%rax");
  }

  pub fn alu_or_bool(&mut self) {
    self.alu_load_integer_operands();
    self.instr("orq %rbx, %rax");
    self.push("%rax");
  }

  pub fn alu_not_bool(&mut self) {
    self.instr("notq (%rsp)");
  }

  fn alu_arithmetic(
    &mut self,
    operation: &'static str,
    ty: Type,
    integer: &[&str],
    result: &str,
    float: &str,
  ) -> CodegenResult<()> {
    match ty {
      Type::UnsignedInt => {
        self.alu_load_integer_operands();
        for instruction in integer {
          self.instr(instruction);
        }
        self.push(result);
      }
      Type::Double => {
        self.alu_load_float_operands();
        self.instr(float);
        self.alu_store_f64();
      }
      ty => return UnsupportedOperandSnafu { operation, ty }.fail(),
    }
    Ok(())
  }

  pub fn alu_add(&mut self, ty: Type) -> CodegenResult<()> {
    self.alu_arithmetic(
      "+",
      ty,
      &["addq %rbx, %rax"],
      "%rax",
      "faddp %st(0), %st(1)",
    )
  }

  pub fn alu_sub(&mut self, ty: Type) -> CodegenResult<()> {
    self.alu_arithmetic(
      "-",
      ty,
      &["subq %rbx, %rax"],
      "%rax",
      "fsubp %st(0), %st(1)",
    )
  }

  pub fn alu_multiply(&mut self, ty: Type) -> CodegenResult<()> {
    self.alu_arithmetic("*", ty, &["mulq %rbx"], "%rax", "fmulp %st(0), %st(1)")
  }

  pub fn alu_divide(&mut self, ty: Type) -> CodegenResult<()> {
    self.alu_arithmetic(
      "/",
      ty,
      &[
        "movq $0, %rdx # Higher part of the dividend",
        "divq %rbx # Quotient goes to %rax",
      ],
      "%rax",
      "fdivp %st(0), %st(1)",
    )
  }

  pub fn alu_modulus(&mut self, ty: Type) -> CodegenResult<()> {
    match ty {
      Type::UnsignedInt => {
        self.alu_load_integer_operands();
        self.instr("movq $0, %rdx # Higher part of the dividend");
        self.instr("divq %rbx # Remainder goes to %rdx");
        self.push("%rdx");
        Ok(())
      }
      Type::Double => {
        let mut call = self.function_call_prepare("fmod", Type::Double, false);
        self.function_call_param(&mut call, Type::Double)?;
        self.function_call_param(&mut call, Type::Double)?;
        // Operands were popped right first; fmod wants the left one first.
        self.instr("movapd %xmm0, %xmm2");
        self.instr("movapd %xmm1, %xmm0");
        self.instr("movapd %xmm2, %xmm1");
        self.function_call_finalize(call)
      }
      ty => UnsupportedOperandSnafu { operation: "%", ty }.fail(),
    }
  }

  /// Compare the two topmost values and push a canonical boolean: all bits
  /// set for true, all clear for false.
  pub fn alu_compare(&mut self, op: RelOp, ty: Type) -> CodegenResult<()> {
    let jump = match op {
      RelOp::Eq => "je",
      RelOp::Ne => "jne",
      RelOp::Ge => "jae",
      RelOp::Le => "jbe",
      RelOp::Gt => "ja",
      RelOp::Lt => "jb",
    };

    match ty.register_class() {
      Some(RegisterClass::Integer) => {
        self.alu_load_integer_operands();
        self.instr("cmpq %rbx, %rax");
      }
      Some(RegisterClass::Float) => {
        self.alu_load_float_operands();
        self.instr("fcomip %st(1), %st");
        self.instr("fstp %st(0) # Clear the floating point stack");
      }
      None => {
        return UnsupportedOperandSnafu {
          operation: "comparison",
          ty,
        }
        .fail();
      }
    }

    let tag = self.labels.allocate();
    self.instr(format!("{jump} __true{tag}"));
    self.instr("pushq $0 # No branching: push false");
    self.instr(format!("jmp __next{tag}"));
    self.emit(format!("__true{tag}:"));
    self.instr("pushq $-1 # Push true");
    self.emit(format!("__next{tag}:"));
    self.depth += 1;
    Ok(())
  }

  /// Convert the value on top of the stack in place.
  pub fn convert(&mut self, from: Type, to: Type) -> CodegenResult<()> {
    if from == to {
      return Ok(());
    }

    match (from, to) {
      // Integers and characters are both plain 64-bit values on the stack.
      (from, to) if from.is_integral() && to.is_integral() => {}
      (from, Type::Double) if from.is_integral() => {
        self.instr("fildq (%rsp)");
        self.instr("fstpl (%rsp)");
      }
      (Type::Double, to) if to.is_integral() => {
        self.instr("fldl (%rsp)");
        self.instr("fisttpq (%rsp)");
      }
      (from, to) => return UnsupportedConversionSnafu { from, to }.fail(),
    }
    Ok(())
  }

  pub fn statement_if_prepare(&mut self) -> IfStatement {
    IfStatement {
      tag: self.labels.allocate(),
    }
  }

  pub fn statement_if_post_check(&mut self, statement: &IfStatement) {
    let tag = statement.tag;
    self.pop("%rax");
    self.instr("test %rax, %rax");
    self.instr(format!("jz __false{tag}"));
    self.emit(format!("__true{tag}:"));
  }

  pub fn statement_if_with_else(&mut self, statement: &IfStatement) {
    let tag = statement.tag;
    self.instr(format!("jmp __next{tag}"));
    self.emit(format!("__false{tag}:"));
  }

  pub fn statement_if_without_else(&mut self, statement: &IfStatement) {
    self.emit(format!("__false{}:", statement.tag));
  }

  pub fn statement_if_finalize(&mut self, statement: IfStatement) {
    self.emit(format!("__next{}:", statement.tag));
  }

  pub fn statement_while_prepare(&mut self) -> WhileStatement {
    let tag = self.labels.allocate();
    self.emit(format!("__while{tag}:"));
    WhileStatement { tag }
  }

  pub fn statement_while_post_check(&mut self, statement: &WhileStatement) {
    self.pop("%rax");
    self.instr("test %rax, %rax");
    self.instr(format!("jz __next{}", statement.tag));
  }

  pub fn statement_while_finalize(&mut self, statement: WhileStatement) {
    let tag = statement.tag;
    self.instr(format!("jmp __while{tag}"));
    self.emit(format!("__next{tag}:"));
  }

  pub fn statement_for_prepare(&mut self, variable: &Variable) -> ForStatement {
    ForStatement {
      tag: self.labels.allocate(),
      variable: variable.clone(),
    }
  }

  pub fn statement_for_post_assignment(&mut self, statement: &ForStatement) {
    self.emit(format!("__for{}:", statement.tag));
  }

  /// Pops the bound, evaluated afresh on every iteration, and leaves the
  /// loop once the control variable is no longer below it.
  pub fn statement_for_post_check(&mut self, statement: &ForStatement) {
    let operand = self.global(&statement.variable);
    self.pop("%rax");
    self.instr(format!("cmpq %rax, {operand}"));
    self.instr(format!("jge __next{}", statement.tag));
  }

  pub fn statement_for_finalize(&mut self, statement: ForStatement) {
    let operand = self.global(&statement.variable);
    let tag = statement.tag;
    self.instr(format!("addq $1, {operand}"));
    self.instr(format!("jmp __for{tag}"));
    self.emit(format!("__next{tag}:"));
  }

  pub fn function_call_prepare(
    &mut self,
    name: &str,
    return_type: Type,
    variadic: bool,
  ) -> FunctionCall {
    self.instr(format!("# call {name}"));
    FunctionCall {
      name: name.to_string(),
      return_type,
      variadic,
      integer_count: 0,
      float_count: 0,
    }
  }

  /// Move the value on top of the stack into the next argument register of
  /// its class. Each call pops one value, so arguments pushed in source
  /// order are assigned registers last-pushed first.
  pub fn function_call_param(&mut self, call: &mut FunctionCall, ty: Type) -> CodegenResult<()> {
    let Some(class) = ty.register_class() else {
      return UnsupportedOperandSnafu {
        operation: "function parameter",
        ty,
      }
      .fail();
    };
    let register = call.register(class)?;

    match class {
      RegisterClass::Integer => {
        self.pop(register);
        if ty == Type::Boolean {
          self.instr(format!("andq $1, {register}"));
        }
        call.integer_count += 1;
      }
      RegisterClass::Float => {
        self.instr(format!("movsd (%rsp), {register}"));
        self.instr("addq $8, %rsp # Effectively pop the float from the stack");
        self.depth -= 1;
        call.float_count += 1;
      }
    }
    Ok(())
  }

  /// Pass the address of a data label as the next integer argument.
  pub fn function_call_label_param(
    &mut self,
    call: &mut FunctionCall,
    label: &str,
  ) -> CodegenResult<()> {
    let register = call.register(RegisterClass::Integer)?;
    self.instr(format!("leaq {label}(%rip), {register}"));
    call.integer_count += 1;
    Ok(())
  }

  pub fn function_call_finalize(&mut self, call: FunctionCall) -> CodegenResult<()> {
    let result = match call.return_type {
      Type::Void => None,
      Type::Boolean => return UnsupportedReturnSnafu { ty: Type::Boolean }.fail(),
      ty => ty.register_class(),
    };

    if call.variadic {
      self.instr(format!(
        "movb ${}, %al # Vector registers used by a variadic call",
        call.float_count
      ));
    }

    // The prologue leaves %rsp 16-byte aligned; every value on the
    // evaluation stack shifts it by 8.
    let misaligned = self.depth.rem_euclid(2) == 1;
    if misaligned {
      self.instr("subq $8, %rsp # align stack");
    }
    self.instr(format!("call {}", self.target.mangle(&call.name)));
    if misaligned {
      self.instr("addq $8, %rsp # unalign stack");
    }

    match result {
      Some(RegisterClass::Integer) => self.push("%rax"),
      Some(RegisterClass::Float) => {
        self.instr("subq $8, %rsp");
        self.instr("movsd %xmm0, (%rsp)");
        self.depth += 1;
      }
      None => {}
    }
    Ok(())
  }

  /// Print the value on top of the stack through `printf`.
  pub fn debug_display(&mut self, ty: Type) -> CodegenResult<()> {
    let format = match ty {
      Type::UnsignedInt | Type::Boolean => FORMAT_UNSIGNED,
      Type::Char => FORMAT_CHAR,
      Type::Double => FORMAT_DOUBLE,
      Type::Void => {
        return UnsupportedOperandSnafu {
          operation: "DISPLAY",
          ty,
        }
        .fail();
      }
    };

    let mut call = self.function_call_prepare("printf", Type::Void, true);
    self.function_call_label_param(&mut call, format)?;
    self.function_call_param(&mut call, ty)?;
    self.function_call_finalize(call)
  }
}
