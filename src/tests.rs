use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    asm::{AsmLine, Instr, Label, Operand, Program},
    compile::{Options, compile, compile_program},
    errors::CompileError,
    symtab::Designator,
};

const GLOBAL_BASE: i64 = 1 << 32;
const STEP_LIMIT: usize = 1_000_000;

fn pop(stack: &mut Vec<i64>) -> i64 {
    stack.pop().expect("operand stack underflow")
}

/// Runs `program` on a model of the target machine and returns the final value
/// of every global cell.
fn execute(program: &Program) -> FxHashMap<String, i64> {
    let address = |designator: &Designator| {
        let index = program.globals.iter().position(|global| global == designator);
        GLOBAL_BASE + index.expect("undeclared global") as i64
    };
    let target = |label: &Label| {
        let wanted = AsmLine::Label(label.clone());
        program.lines.iter().position(|line| *line == wanted).expect("undefined label")
    };

    let mut memory = FxHashMap::default();
    let mut stack = vec![];
    let mut links = vec![];
    let mut pc = 0;
    for _ in 0..STEP_LIMIT {
        let Some(line) = program.lines.get(pc) else {
            assert!(stack.is_empty(), "values left on the operand stack: {stack:?}");
            assert!(links.is_empty(), "unreturned calls: {links:?}");
            return program
                .globals
                .iter()
                .enumerate()
                .map(|(i, global)| {
                    let value = memory.get(&(GLOBAL_BASE + i as i64)).copied().unwrap_or(0);
                    (global.to_string(), value)
                })
                .collect();
        };
        pc += 1;
        let AsmLine::Instr(instr) = line else { continue };
        match instr {
            Instr::Pushi(Operand::Imm(int)) => stack.push(*int),
            Instr::Pushi(Operand::Global(designator)) => stack.push(address(designator)),
            Instr::Pushi(Operand::Label(label)) => stack.push(target(label) as i64),
            Instr::Push => {
                let addr = pop(&mut stack);
                stack.push(memory.get(&addr).copied().unwrap_or(0));
            }
            Instr::Pop => {
                let addr = pop(&mut stack);
                let value = pop(&mut stack);
                memory.insert(addr, value);
            }
            Instr::Add | Instr::Sub | Instr::Slt => {
                let b = pop(&mut stack);
                let a = pop(&mut stack);
                stack.push(match instr {
                    Instr::Add => a + b,
                    Instr::Sub => a - b,
                    _ => i64::from(a < b),
                });
            }
            Instr::Beq(label) | Instr::Bne(label) => {
                let b = pop(&mut stack);
                let a = pop(&mut stack);
                if (a == b) == matches!(instr, Instr::Beq(_)) {
                    pc = target(label);
                }
            }
            Instr::Jpush => {
                links.push(pc);
                pc = pop(&mut stack) as usize;
            }
            Instr::Jpop => pc = pop(&mut stack) as usize,
            Instr::Jr => pc = links.pop().expect("return outside of a call"),
        }
    }
    panic!("program did not halt within {STEP_LIMIT} steps");
}

fn run(src: &str) -> FxHashMap<String, i64> {
    execute(&compile_program(src, Options::default()).unwrap())
}

fn instructions(src: &str) -> Vec<String> {
    compile_program(src, Options::default()).unwrap().instructions().map(ToString::to_string).collect()
}

fn labels(src: &str) -> Vec<String> {
    compile_program(src, Options::default()).unwrap().labels().map(ToString::to_string).collect()
}

fn contains_run(haystack: &[String], needle: &[&str]) -> bool {
    haystack.windows(needle.len()).any(|window| window.iter().zip(needle).all(|(a, b)| a == b))
}

macro_rules! test_main {
    ($body: literal, $($var: literal => $expected: expr),+ $(,)?) => {
        let globals = run(concat!("void main() {\n", $body, "\n}\n"));
        $(assert_eq!(globals[concat!("main_", $var)], $expected, "value of `{}`", $var);)+
    };
}

macro_rules! assert_err {
    ($src: expr, $pattern: pat $(if $guard: expr)?) => {
        let err = compile_program($src, Options::default()).unwrap_err();
        assert!(matches!(err, $pattern $(if $guard)?), "unexpected error: {err:?}");
    };
}

#[test]
fn test_add_function() {
    let src = "int add(int a, int b) { return a + b; }\nvoid main() { int x; x = add(2, 3); }\n";
    let program = compile_program(src, Options::default()).unwrap();
    let expected = "\
.globl res
.globl add_a
.globl add_b
.globl main_x
\tpushi main
\tjpop
add:
\tpushi add_b
\tpop
\tpushi add_a
\tpop
\tpushi add_a
\tpush
\tpushi add_b
\tpush
\tadd
\tjr
main:
\tpushi main_x
\tpush
\tpushi 2
\tpushi 3
\tpushi add
\tjpush
\tpushi res
\tpop
\tpushi main_x
\tpop
\tpushi res
\tpush
\tpushi main_x
\tpop
";
    assert_eq!(program.to_string(), expected);
    assert_eq!(execute(&program)["main_x"], 5);
}

#[test]
fn test_if_listing() {
    let src = "void main(){ int x; x=1; if(x==1){x=2;} }";
    let program = compile_program(src, Options::default()).unwrap();
    let expected = "\
.globl res
.globl main_x
\tpushi main
\tjpop
main:
\tpushi 1
\tpushi main_x
\tpop
\tpushi main_x
\tpush
\tpushi 1
\tbne end_if_0
\tpushi 2
\tpushi main_x
\tpop
end_if_0:
";
    assert_eq!(program.to_string(), expected);
    assert_eq!(execute(&program)["main_x"], 2);
}

#[test]
fn test_while_labels_count_across_functions() {
    let src = "
void f() {
    int i = 0;
    while (i < 2) { i += 1; }
}
void main() {
    int j = 0;
    while (j < 1) { j += 1; }
    while (j < 3) { j += 1; }
    f();
}
";
    assert_eq!(
        labels(src),
        ["f", "start_while_0", "end_while_0", "main", "start_while_1", "end_while_1", "start_while_2", "end_while_2"]
    );
    let globals = run(src);
    assert_eq!(globals["main_j"], 3);
    assert_eq!(globals["f_i"], 2);
}

#[test]
fn test_call_spills_and_restores_in_reverse() {
    let src = "int g(int a) { return a; }\nvoid main() { int y = 4; int z; z = g(y) + 1; }";
    let code = instructions(src);
    assert!(contains_run(&code, &[
        "pushi main_y", "push", "pushi main_z", "push",
        "pushi main_y", "push",
        "pushi g", "jpush",
        "pushi res", "pop",
        "pushi main_z", "pop", "pushi main_y", "pop",
        "pushi res", "push",
        "pushi 1", "add",
        "pushi main_z", "pop",
    ]));
    test_main!("int y = 4; int z; z = y + 1;", "z" => 5);
    let globals = run(src);
    assert_eq!((globals["main_y"], globals["main_z"]), (4, 5));
}

#[test]
fn test_recursion_survives_spills() {
    let src = "
int sum(int n) {
    if (n == 0) { return 0; }
    return n + sum(n - 1);
}
void main() { int r = sum(4); }
";
    assert_eq!(run(src)["main_r"], 10);
}

#[test]
fn test_dangling_else_binds_to_inner_if() {
    let src = "void main() { int x = 1; int r = 0; if (x == 1) if (x == 2) r = 1; else r = 2; }";
    let labels = labels(src);
    assert!(labels.iter().any(|label| label == "end_else_1"));
    assert!(!labels.iter().any(|label| label == "end_else_0"));
    assert_eq!(run(src)["main_r"], 2);

    test_main!("int x = 1; int r = 0; if (x == 2) { if (x == 1) { r = 1; } } else { r = 3; }", "r" => 3);
}

#[test]
fn test_else_if_chain() {
    for (x, expected) in [(1, 10), (2, 20), (7, 30)] {
        let src = format!(
            "void main() {{
                int x = {x}; int r;
                if (x == 1) {{ r = 10; }}
                else if (x == 2) {{ r = 20; }}
                else {{ r = 30; }}
            }}"
        );
        assert_eq!(run(&src)["main_r"], expected, "x = {x}");
    }
}

#[test]
fn test_comparison_lowering() {
    let a: &[&str] = &["pushi main_a", "push"];
    let slt: &[&str] = &["slt", "pushi 1"];
    let (beq, bne): (&[&str], &[&str]) = (&["beq end_if_0"], &["bne end_if_0"]);
    let variable: &[&str] = &["pushi main_b", "push"];
    let literal: &[&str] = &["pushi 2"];
    for (rhs, b) in [("b", variable), ("2", literal)] {
        let cases = [
            ("==", [a, b, bne].concat()),
            ("!=", [a, b, beq].concat()),
            (">=", [a, b, slt, beq].concat()),
            ("<=", [b, a, slt, beq].concat()),
            (">", [b, a, slt, bne].concat()),
            ("<", [a, b, slt, bne].concat()),
        ];
        for (op, expected) in cases {
            let src = format!("void main() {{ int a; int b; if (a {op} {rhs}) {{ a = 1; }} }}");
            assert!(contains_run(&instructions(&src), &expected), "lowering of `a {op} {rhs}`");
        }
    }
    let code = instructions("void main() { int a; if (a < 2) { a = 1; } }");
    assert_eq!(&code[..6], ["pushi main_a", "push", "pushi 2", "slt", "pushi 1", "bne end_if_0"]);
}

#[test]
fn test_comparisons_evaluate_correctly() {
    let cases: [(&str, fn(i64, i64) -> bool); 6] = [
        ("==", |a, b| a == b),
        ("!=", |a, b| a != b),
        ("<", |a, b| a < b),
        ("<=", |a, b| a <= b),
        (">", |a, b| a > b),
        (">=", |a, b| a >= b),
    ];
    for (op, holds) in cases {
        for a in 1..=3 {
            for rhs in ["b", "2"] {
                let src = format!(
                    "void main() {{ int a = {a}; int b = 2; int r = 0; if (a {op} {rhs}) {{ r = 1; }} }}"
                );
                assert_eq!(run(&src)["main_r"], i64::from(holds(a, 2)), "{a} {op} {rhs}");
            }
        }
    }
}

#[test]
fn test_for_loop() {
    test_main!("int s = 0; for (int i = 0; i <= 3; i += 1) { s += i; }", "s" => 6);
    test_main!("int s = 0; int i; for (i = 5; i > 0; i -= 2) s += 1;", "s" => 3, "i" => -1);
    assert_eq!(labels("void main() { int i; for (;i < 1;) { i = 1; } }"), ["main", "start_for_0", "end_for_0"]);
}

#[test]
fn test_arithmetic() {
    test_main!("int x = 10 - (3 - 1) - -2;", "x" => 10);
    test_main!("int a = 5, b = a + 1; a -= b;", "a" => -1, "b" => 6);
    test_main!("int x = 2; x + 1;", "x" => 2);
    assert_eq!(run("void main() { int x = 2; x + 1; }")["res"], 3);
}

#[test]
fn test_labels_are_unique() {
    let src = "
int f(int n) {
    int r = 0;
    if (n < 1) { r = 1; } else { r = 2; }
    while (n > 0) { n -= 1; if (n == 3) { r += 1; } }
    return r;
}
void main() {
    int i;
    for (i = 0; i < 3; i += 1) { if (i != 1) { i += 0; } else { i += 0; } }
    while (i < 5) { i += 1; }
    i = f(i);
}
";
    let labels = labels(src);
    let unique: FxHashSet<_> = labels.iter().collect();
    assert_eq!(unique.len(), labels.len(), "{labels:?}");
}

#[test]
fn test_block_scopes_do_not_leak() {
    assert_err!(
        "void main() { int x = 1; if (x == 1) { int t = 2; } x = t; }",
        CompileError::UnboundVariable { ref name, line: 1, .. } if name == "t"
    );
    assert_err!(
        "void main() { int x; while (x < 1) { int t; x = 1; } t = 1; }",
        CompileError::UnboundVariable { ref name, .. } if name == "t"
    );
    assert_err!(
        "void main() { for (int i = 0; i < 1; i += 1) { } i = 1; }",
        CompileError::UnboundVariable { ref name, .. } if name == "i"
    );
    assert_err!(
        "void main() { { int t; } t = 1; }",
        CompileError::UnboundVariable { ref name, .. } if name == "t"
    );

    let src = "void main() { int x; if (x == 0) { int t = 1; } if (x == 0) { int t = 2; x = t; } }";
    let program = compile_program(src, Options::default()).unwrap();
    assert_eq!(program.globals.iter().filter(|global| global.as_str() == "main_t").count(), 1);
    assert_eq!(execute(&program)["main_x"], 2);
}

#[test]
fn test_returns() {
    test_main!("int x = 1; if (x == 1) { return; } x = 2;", "x" => 1);
    let code = instructions("void main() { int x = 1; if (x == 1) { return; } x = 2; }");
    assert!(contains_run(&code, &["pushi end_main", "jpop"]));
    let program = compile_program("void main() { int x; while (x < 9) { return 4; } }", Options::default()).unwrap();
    assert_eq!(program.lines.last(), Some(&AsmLine::Label(Label::Exit("main".into()))));
    assert_eq!(execute(&program)["res"], 4);

    let src = "
int zero() { int a = 1; }
int early() { return 3; a = 1; }
void nothing() { return; }
void main() { int x = zero(); int y = early(); nothing(); }
";
    let globals = run(src);
    assert_eq!((globals["main_x"], globals["main_y"]), (0, 3));
}

#[test]
fn test_bare_calls_discard_results() {
    let code = instructions("int f() { return 7; } void main() { f(); }");
    assert_eq!(&code[code.len() - 4..], ["pushi f", "jpush", "pushi res", "pop"]);
    let code = instructions("void f() { } void main() { f(); }");
    assert_eq!(&code[code.len() - 2..], ["pushi f", "jpush"]);
    assert_eq!(run("int f() { return 7; } void main() { f(); }")["res"], 7);
}

#[test]
fn test_forward_calls_and_one_liners() {
    let src = "void main() { int x = twice(4); } int twice(int v) { return v + v; }";
    assert_eq!(run(src)["main_x"], 8);
    let src = "
int max(int a, int b) {
    if (a > b) {
        return a;
    }
    else
    {
        return b;
    }
}
void main() { int m = max(3, 9) + max(4, 1); }
";
    assert_eq!(run(src)["main_m"], 13);
}

#[test]
fn test_annotation() {
    let src = "void main() {\n    int x = 1; // one\n    x += 2;\n}\n";
    let annotated = compile("t.c", src, Options { annotate: true }).unwrap();
    assert!(annotated.contains("# 1: void main() {\n"));
    assert!(annotated.contains("# 2: int x = 1;\n\tpushi 1\n"));
    assert!(annotated.contains("# 3: x += 2;\n"));
    assert!(!compile("t.c", src, Options::default()).unwrap().contains('#'));
}

#[test]
fn test_report_carries_source() {
    let report = compile("bad.c", "void main() {\n  y = 1;\n}", Options::default()).unwrap_err();
    assert_eq!(report.to_string(), "cannot find variable `y` in this scope");
    assert!(report.source_code().is_some());
}

#[test]
fn test_errors() {
    assert_err!("void main() { int x = 1 @ 2; }", CompileError::Lex { line: 1, .. });
    assert_err!("void main() { x = 1; }", CompileError::UnboundVariable { .. });
    assert_err!(
        "void main() { int x; if (x = 1) { } }",
        CompileError::UnknownComparison { ref found, .. } if found == "="
    );
    assert_err!(
        "void main() { int x; if (x ! 1) { } }",
        CompileError::UnknownComparison { ref found, .. } if found == "!"
    );
    assert_err!(
        "void main() { int x; while (x) { } }",
        CompileError::UnknownComparison { ref found, .. } if found == "no operator"
    );
    assert_err!("void main() {\n int x;\n", CompileError::UnbalancedBlock { line: 1, .. });
    assert_err!(
        "void main() {\n if (1 == 1) {\n return;\n x = 1;\n",
        CompileError::UnbalancedBlock { line: 2, .. }
    );
    assert_err!("void main() { int x; int x; }", CompileError::DuplicateDeclaration { .. });
    assert_err!("int f(int a, int a) { return a; }", CompileError::DuplicateDeclaration { .. });
    assert_err!(
        "void f() { }\nvoid f() { }",
        CompileError::DuplicateFunction { ref name, line: 2, .. } if name == "f"
    );
    assert_err!("void main() { h(); }", CompileError::UnknownFunction { .. });
    assert_err!(
        "int f(int a) { return a; } void main() { int x = f(1, 2); }",
        CompileError::ArityMismatch { expected: 1, found: 2, .. }
    );
    assert_err!("int f(int a) { return a; } void main() { f(); }", CompileError::ArityMismatch { found: 0, .. });
    assert_err!("void f() { } void main() { int x = f(); }", CompileError::VoidValue { .. });
    assert_err!(
        "void main() { int a; a = a * 2; }",
        CompileError::UnsupportedOperator { ref op, .. } if op == "*"
    );
    assert_err!("void main() { int a = 4 / 2; }", CompileError::UnsupportedOperator { .. });
    assert_err!(
        "void f() { return 1; }",
        CompileError::ReturnValue { reason: "unexpected return value", .. }
    );
    assert_err!("int f() { return; }", CompileError::ReturnValue { reason: "missing return value", .. });
    assert_err!("x = 1;", CompileError::UnexpectedToken { .. });
    assert_err!("void main() { else { } }", CompileError::UnexpectedToken { .. });
    assert_err!("void main() { int x = ", CompileError::UnexpectedEof { .. });
}

#[test]
fn test_error_lines() {
    let err = compile_program("void main() {\n\n  int x;\n  y = x;\n}", Options::default()).unwrap_err();
    assert_eq!(err.line(), 4);
}

#[test]
fn test_missing_main() {
    assert_err!("int f() { return 1; }", CompileError::MissingEntryPoint { line: 1, .. });
    assert_err!("", CompileError::MissingEntryPoint { .. });
}

#[test]
fn test_main_cannot_be_called() {
    assert_err!(
        "void g() { main(); } void main() { int x = 1; g(); x = 2; }",
        CompileError::EntryPointCall { line: 1, .. }
    );
    assert_err!("int main() { return 0; } void f() { int x = main(); }", CompileError::EntryPointCall { .. });
}

#[test]
fn test_function_names_cannot_shadow_generated_names() {
    assert_err!(
        "void end_if_0() { } void main() { int x; if (x == 0) { x = 1; } end_if_0(); }",
        CompileError::ReservedName { ref name, .. } if name == "end_if_0"
    );
    assert_err!(
        "void res() { } void main() { res(); }",
        CompileError::ReservedName { ref name, .. } if name == "res"
    );
    assert_err!("void end_main() { } void main() { }", CompileError::ReservedName { .. });
    assert_err!("int start_while_4(int a) { return a; } void main() { }", CompileError::ReservedName { .. });

    let src = "void end_if() { } void start_while_x() { } void main() { end_if(); start_while_x(); }";
    let labels = labels(src);
    let unique: FxHashSet<_> = labels.iter().collect();
    assert_eq!(unique.len(), labels.len(), "{labels:?}");
}

#[test]
fn test_variables_never_share_a_cell() {
    assert_err!(
        "void a() { int b_c = 5; } void a_b() { int c = 7; } void main() { a(); a_b(); }",
        CompileError::NameCollision { ref designator, ref other, line: 1, .. }
            if designator == "a_b_c" && other == "`b_c` in `a`"
    );
    assert_err!(
        "void main_x() { } void main() { int x; main_x(); }",
        CompileError::NameCollision { ref name, .. } if name == "x"
    );
    assert_err!("void end() { int if_0; } void main() { }", CompileError::NameCollision { .. });

    let src = "void a() { int b_c = 5; } void a_bc() { int c = 7; } void main() { a(); a_bc(); }";
    let globals = run(src);
    assert_eq!((globals["a_b_c"], globals["a_bc_c"]), (5, 7));
}
