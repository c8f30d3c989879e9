use anyhow::Result;
use proplasm::{
    codegen::AllocationReport,
    frame::Error as FrameError,
    ir::{BinaryOperator, LiveSet},
    registerize, BlockId, Error, Instruction, InstructionKind, Palette, Program, Register,
    Variable,
};

fn var(name: &str) -> Variable {
    Variable::new(name)
}

fn set(names: &[&str]) -> LiveSet {
    names.iter().map(|name| var(name)).collect()
}

fn find<'a>(program: &'a Program, block: BlockId, text: &str) -> &'a Instruction {
    program[block]
        .instructions()
        .iter()
        .find(|instruction| instruction.to_string() == text)
        .unwrap_or_else(|| panic!("no `{}` in {}:\n{}", text, block, program))
}

/// Every interfering pair got different registers and every variable of the
/// graph got one.
fn assert_valid_coloring(report: &AllocationReport) {
    for a in report.graph.variables() {
        let ra = report.registers.get(a);
        assert!(ra.is_some(), "{} has no register", a);
        for b in report.graph.adjacent(a) {
            assert_ne!(ra, report.registers.get(b), "{} and {} share a register", a, b);
        }
    }
}

#[test]
fn straight_line_with_one_register_spills() -> Result<()> {
    let mut program = Program::new();
    program.add_instruction(Instruction::assign(var("a"), 1));
    program.add_instruction(Instruction::assign(var("b"), 2));
    program.add_instruction(Instruction::binary(var("c"), var("a"), BinaryOperator::Add, var("b")));

    let reports = registerize(&mut program, &Palette::with_size(1)?)?;
    assert_eq!(reports.len(), 1);
    let report = &reports[0];

    assert!(!report.spilled.is_empty());
    assert!(report.spilled.contains(&var("a")) || report.spilled.contains(&var("b")));
    assert_eq!(report.frame_size, 4 * report.spilled.len() as u32);
    assert_valid_coloring(report);

    let last = program[report.root].instructions().last().unwrap();
    assert_eq!(last.to_string(), "c = a + b");
    assert_ne!(last.register(&var("a")), last.register(&var("b")));
    assert!(last.register(&var("c")).is_some());
    Ok(())
}

#[test]
fn if_else_merge_keeps_both_branches_live() -> Result<()> {
    let mut program = Program::new();
    let head = program.current_block();
    program.add_instruction(Instruction::input(var("c")));
    let then_block = program.new_block(true);
    program.add_instruction(Instruction::input(var("x")));
    let else_block = program.new_block(false);
    program.add_instruction(Instruction::input(var("y")));
    let merge = program.new_block(false);
    program.add_instruction(Instruction::print(var("x")));
    program.add_instruction(Instruction::print(var("y")));
    program.add_follow(head, else_block)?;
    program.add_follow(then_block, merge)?;
    program.add_follow(else_block, merge)?;
    program.add_instruction_to(
        head,
        Instruction::new(InstructionKind::If {
            condition: var("c").into(),
            then_block,
            else_block: Some(else_block),
            end_block: merge,
        }),
    )?;
    program.label_blocks()?;

    let reports = registerize(&mut program, &Palette::default())?;
    assert_eq!(reports.len(), 1);
    assert_valid_coloring(&reports[0]);

    let first = &program[merge].instructions()[0];
    assert_eq!(first.live_in(), &set(&["x", "y"]));
    assert!(find(&program, then_block, "x = input()").live_out().contains(&var("y")));
    assert!(find(&program, else_block, "y = input()").live_out().contains(&var("x")));
    assert!(program[merge].start_label().is_some());
    Ok(())
}

#[test]
fn while_loop_carries_variable_across_back_edge() -> Result<()> {
    let mut program = Program::new();
    program.add_instruction(Instruction::assign(var("i"), 0));
    let cond_block = program.new_block(true);
    program.add_instruction(Instruction::binary(var("t"), var("i"), BinaryOperator::Lt, 10));
    let body = program.new_block(true);
    program.add_instruction(Instruction::binary(var("i"), var("i"), BinaryOperator::Add, 1));
    let next_block = program.new_block(false);
    program.add_instruction(Instruction::print(var("i")));
    program.add_follow(body, cond_block)?;
    program.add_follow(cond_block, next_block)?;
    program.add_instruction_to(
        cond_block,
        Instruction::new(InstructionKind::While {
            condition: var("t").into(),
            cond_block,
            end_block: body,
            next_block,
        }),
    )?;

    let reports = registerize(&mut program, &Palette::default())?;
    assert_valid_coloring(&reports[0]);

    let tail = program[body].instructions().last().unwrap();
    assert!(tail.to_string().starts_with("i = i + @"));
    assert!(tail.live_out().contains(&var("i")));
    assert!(program[cond_block].instructions()[0].live_in().contains(&var("i")));
    Ok(())
}

#[test]
fn fifteen_interfering_variables_with_ten_registers() -> Result<()> {
    let names: Vec<_> = (0..15).map(|i| var(&format!("v{:02}", i))).collect();
    let mut program = Program::new();
    for name in &names {
        program.add_instruction(Instruction::input(name.clone()));
    }
    for name in &names {
        program.add_instruction(Instruction::print(name.clone()));
    }

    let reports = registerize(&mut program, &Palette::with_size(10)?)?;
    let report = &reports[0];

    assert!(report.spilled.len() >= 5);
    assert_eq!(report.frame_size, 4 * report.spilled.len() as u32);
    assert_eq!(report.attempts, report.spilled.len() + 1);
    assert_valid_coloring(report);
    for instruction in program[report.root].instructions() {
        assert_eq!(instruction.frame_size(), report.frame_size);
    }

    // Every variable still live together sits in a distinct register.
    let kept: Vec<_> = names
        .iter()
        .filter(|name| !report.spilled.contains(name))
        .collect();
    assert_eq!(kept.len(), 15 - report.spilled.len());
    let registers: std::collections::HashSet<_> = kept
        .iter()
        .map(|name| report.registers.get(name).unwrap())
        .collect();
    assert_eq!(registers.len(), kept.len());
    Ok(())
}

#[test]
fn call_arguments_die_at_the_call() -> Result<()> {
    let mut program = Program::new();
    program.add_instruction(Instruction::input(var("a")));
    program.add_instruction(Instruction::input(var("b")));
    program.add_instruction(Instruction::call(
        var("r"),
        "f",
        vec![var("a").into(), var("b").into()],
    ));
    program.add_instruction(Instruction::print(var("r")));

    let reports = registerize(&mut program, &Palette::default())?;
    assert_valid_coloring(&reports[0]);

    let call = find(&program, reports[0].root, "r = f(a, b)");
    assert!(call.live_in().contains(&var("a")));
    assert!(call.live_in().contains(&var("b")));
    assert_eq!(call.live_out(), &set(&["r"]));
    Ok(())
}

#[test]
fn spilled_call_arguments_live_together_with_four_registers() -> Result<()> {
    let args = ["a", "b", "c", "d"];
    let busy = ["e1", "e2", "e3", "e4"];
    let mut program = Program::new();
    for name in args.iter().chain(&busy) {
        program.add_instruction(Instruction::input(var(name)));
    }
    for _ in 0..3 {
        for name in &busy {
            program.add_instruction(Instruction::print(var(name)));
        }
    }
    program.add_instruction(Instruction::call(
        var("r"),
        "f",
        args.iter().map(|name| var(name).into()).collect(),
    ));
    program.add_instruction(Instruction::print(var("r")));

    let reports = registerize(&mut program, &Palette::with_size(4)?)?;
    let report = &reports[0];

    assert!(!report.spilled.is_empty());
    assert_eq!(report.frame_size, 4 * report.spilled.len() as u32);
    assert_eq!(report.attempts, report.spilled.len() + 1);
    assert_valid_coloring(report);

    let call = find(&program, report.root, "r = f(a, b, c, d)");
    assert_eq!(call.live_in(), &set(&args));
    assert_eq!(call.live_out(), &set(&["r"]));
    let registers: std::collections::HashSet<_> = args
        .iter()
        .map(|name| call.register(&var(name)).unwrap())
        .collect();
    assert_eq!(registers.len(), args.len());
    Ok(())
}

#[test]
fn functions_are_allocated_independently() -> Result<()> {
    let mut program = Program::new();
    let head = program.current_block();
    program.add_instruction(Instruction::input(var("x")));
    program.add_instruction(Instruction::print(var("x")));
    let body = program.new_block(false);
    program.add_instruction(Instruction::argument_load(var("n"), 0));
    program.add_instruction(Instruction::ret(Some(var("n").into())));
    program.add_instruction_to(
        head,
        Instruction::new(InstructionKind::FunctionDeclare {
            name: "f".into(),
            body_block: body,
        }),
    )?;

    let reports = registerize(&mut program, &Palette::default())?;
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[1].root, body);
    assert!(reports[0].registers.get(&var("n")).is_none());
    assert!(reports[1].registers.get(&var("x")).is_none());
    assert_eq!(
        program[body].instructions()[0].register(&var("n")),
        reports[1].registers.get(&var("n"))
    );
    Ok(())
}

#[test]
fn configuration_errors() {
    let mut program = Program::new();
    program.add_instruction(Instruction::input(var("x")));

    let empty = Palette::new([]).unwrap();
    assert_eq!(
        registerize(&mut program, &empty).unwrap_err(),
        Error::CodegenError(proplasm::codegen::Error::EmptyPalette)
    );

    assert_eq!(
        Palette::new([Register::S0, Register::Sp]),
        Err(FrameError::ReservedRegister(Register::Sp))
    );
    assert!(matches!(
        Palette::with_size(16),
        Err(FrameError::PaletteTooLarge { requested: 16, .. })
    ));
}
