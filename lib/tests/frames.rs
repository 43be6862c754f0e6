mod common;

use classweave::jvm::opcodes::*;
use classweave::jvm::*;
use common::*;

#[test]
fn boolean_branch_has_one_same_frame() {
    // int f(boolean b) { if (b) return 1; return 2; }
    let mut writer = class_writer("A", Version::JAVA8, FrameComputation::Auto);
    if let Some(mut method) = writer.visit_method(MethodAccessFlags::empty(), "f", "(Z)I", None, &[])
    {
        let otherwise = Label::new();
        method.visit_var_insn(ILOAD, 1);
        method.visit_jump_insn(IFEQ, otherwise);
        method.visit_insn(ICONST_1);
        method.visit_insn(IRETURN);
        method.visit_label(otherwise);
        method.visit_insn(ICONST_2);
        method.visit_insn(IRETURN);
        method.visit_end();
    }
    writer.visit_end();
    let bytes = writer.to_bytes().unwrap();

    let code = method_code(&bytes, "f").unwrap();
    assert_eq!(code.max_stack, 1);
    assert_eq!(code.max_locals, 2);
    assert_eq!(code.code, [ILOAD_1, IFEQ, 0, 5, ICONST_1, IRETURN, ICONST_2, IRETURN]);

    // One entry: SAME frame at offset 6
    assert_eq!(code.attributes["StackMapTable"], [0, 1, 6]);
}

#[test]
fn growing_locals_use_append_frames() {
    let mut writer = class_writer("B", Version::JAVA8, FrameComputation::Auto);
    if let Some(mut method) =
        writer.visit_method(MethodAccessFlags::STATIC, "g", "()V", None, &[])
    {
        let first = Label::new();
        let second = Label::new();
        method.visit_insn(ICONST_0);
        method.visit_var_insn(ISTORE, 0);
        method.visit_jump_insn(GOTO, first);
        method.visit_label(first);
        method.visit_insn(ICONST_0);
        method.visit_var_insn(ISTORE, 1);
        method.visit_jump_insn(GOTO, second);
        method.visit_label(second);
        method.visit_insn(RETURN);
        method.visit_end();
    }
    writer.visit_end();
    let bytes = writer.to_bytes().unwrap();

    let code = method_code(&bytes, "g").unwrap();
    assert_eq!(code.max_locals, 2);
    assert_eq!(
        code.attributes["StackMapTable"],
        [
            0, 2, // two entries
            252, 0, 5, 1, // APPEND int at offset 5
            252, 0, 4, 1, // APPEND int at offset 10
        ]
    );
}

/// `while (n > 0) { push 1, 1, 1; pop them; n--; }`
fn counting_loop(writer: &mut ClassWriter) {
    if let Some(mut method) =
        writer.visit_method(MethodAccessFlags::STATIC, "loop", "(I)V", None, &[])
    {
        let head = Label::new();
        let done = Label::new();
        method.visit_label(head);
        method.visit_var_insn(ILOAD, 0);
        method.visit_jump_insn(IFLE, done);
        for _ in 0..3 {
            method.visit_insn(ICONST_1);
        }
        for _ in 0..3 {
            method.visit_insn(POP);
        }
        method.visit_iinc_insn(0, -1);
        method.visit_jump_insn(GOTO, head);
        method.visit_label(done);
        method.visit_insn(RETURN);
        method.visit_end();
    }
}

#[test]
fn max_stack_of_loop() {
    let mut writer = class_writer("C", Version::JAVA6, FrameComputation::Auto);
    counting_loop(&mut writer);
    writer.visit_end();
    let bytes = writer.to_bytes().unwrap();

    let code = method_code(&bytes, "loop").unwrap();
    assert_eq!(code.max_stack, 3);
    assert_eq!(code.max_locals, 1);
    assert!(!code.attributes.contains_key("StackMapTable"));
}

#[test]
fn max_stack_of_loop_with_frames() {
    let mut writer = class_writer("C", Version::JAVA8, FrameComputation::Auto);
    counting_loop(&mut writer);
    writer.visit_end();
    let bytes = writer.to_bytes().unwrap();

    let code = method_code(&bytes, "loop").unwrap();
    assert_eq!(code.max_stack, 3);
    assert!(code.attributes.contains_key("StackMapTable"));
}

#[test]
fn forced_frames_on_old_classes_use_legacy_attribute() {
    let mut writer = class_writer("D", Version::JAVA1_4, FrameComputation::Frames);
    counting_loop(&mut writer);
    writer.visit_end();
    let bytes = writer.to_bytes().unwrap();

    let code = method_code(&bytes, "loop").unwrap();
    assert!(code.attributes.contains_key("StackMap"));
    assert!(!code.attributes.contains_key("StackMapTable"));
}

#[test]
fn exception_handler_frames() {
    let mut writer = class_writer("E", Version::JAVA8, FrameComputation::Auto);
    if let Some(mut method) =
        writer.visit_method(MethodAccessFlags::STATIC, "h", "()V", None, &[])
    {
        let start = Label::new();
        let end = Label::new();
        let handler = Label::new();
        let after = Label::new();
        method.visit_try_catch_block(start, end, handler, Some("java/lang/ArithmeticException"));
        method.visit_label(start);
        method.visit_insn(ICONST_1);
        method.visit_insn(ICONST_0);
        method.visit_insn(IDIV);
        method.visit_insn(POP);
        method.visit_label(end);
        method.visit_jump_insn(GOTO, after);
        method.visit_label(handler);
        method.visit_insn(POP);
        method.visit_label(after);
        method.visit_insn(RETURN);
        method.visit_end();
    }
    writer.visit_end();
    let bytes = writer.to_bytes().unwrap();

    let code = method_code(&bytes, "h").unwrap();
    assert_eq!(code.max_stack, 2);
    assert_eq!(code.exception_table.len(), 1);
    let [start_pc, end_pc, handler_pc, _] = code.exception_table[0];
    assert_eq!((start_pc, end_pc, handler_pc), (0, 4, 7));

    let table = &code.attributes["StackMapTable"];
    assert_eq!(&table[..2], [0, 2]);
    // SAME_LOCALS_1_STACK_ITEM at offset 7 with an object type
    assert_eq!(table[2], 64 + 7);
    assert_eq!(table[3], 7);
    // SAME frame at offset 8
    assert_eq!(table[6], 0);
}

#[test]
fn unreachable_code_is_replaced() {
    let mut writer = class_writer("F", Version::JAVA8, FrameComputation::Auto);
    if let Some(mut method) =
        writer.visit_method(MethodAccessFlags::PUBLIC, "dead", "()V", None, &[])
    {
        method.visit_insn(RETURN);
        method.visit_insn(ICONST_1);
        method.visit_insn(POP);
        method.visit_insn(RETURN);
        method.visit_end();
    }
    writer.visit_end();
    let bytes = writer.to_bytes().unwrap();

    let code = method_code(&bytes, "dead").unwrap();
    assert_eq!(code.code, [RETURN, NOP, NOP, ATHROW]);
    assert_eq!(code.max_stack, 1);
    // FULL frame at offset 1: `this` is dropped, a Throwable is on the stack
    let table = &code.attributes["StackMapTable"];
    assert_eq!(&table[..2], [0, 1]);
    // type, offset, no locals, one stack item
    assert_eq!(&table[2..9], [255, 0, 1, 0, 0, 0, 1]);
    assert_eq!(table[9], 7);
}

#[test]
fn loop_growing_the_stack_is_rejected() {
    let mut writer = class_writer("G", Version::JAVA8, FrameComputation::Frames);
    if let Some(mut method) =
        writer.visit_method(MethodAccessFlags::STATIC, "spin", "()V", None, &[])
    {
        let head = Label::new();
        method.visit_label(head);
        method.visit_insn(ICONST_0);
        method.visit_jump_insn(GOTO, head);
        method.visit_end();
    }
    writer.visit_end();

    match writer.to_bytes() {
        Err(Error::InconsistentStackHeight { method, offset }) => {
            assert_eq!(method, "G.spin()V");
            assert_eq!(offset, 0);
        }
        other => panic!("expected a stack height error, got {:?}", other.map(|b| b.len())),
    }
}

#[test]
fn rethrown_multi_catch_merges_to_common_exception() {
    // static int f(int x) {
    //   try { return x / 1; }
    //   catch (IllegalArgumentException | ArithmeticException e) { if (x > 5) throw e; }
    //   return 0;
    // }
    let mut writer = class_writer("H", Version::JAVA8, FrameComputation::Auto);
    if let Some(mut method) =
        writer.visit_method(MethodAccessFlags::STATIC, "f", "(I)I", None, &[])
    {
        let start = Label::new();
        let end = Label::new();
        let illegal = Label::new();
        let arithmetic = Label::new();
        let caught = Label::new();
        let done = Label::new();
        method.visit_try_catch_block(start, end, illegal, Some("java/lang/IllegalArgumentException"));
        method.visit_try_catch_block(start, end, arithmetic, Some("java/lang/ArithmeticException"));
        method.visit_label(start);
        method.visit_var_insn(ILOAD, 0);
        method.visit_insn(ICONST_1);
        method.visit_insn(IDIV);
        method.visit_insn(IRETURN);
        method.visit_label(end);
        method.visit_label(illegal);
        method.visit_var_insn(ASTORE, 1);
        method.visit_jump_insn(GOTO, caught);
        method.visit_label(arithmetic);
        method.visit_var_insn(ASTORE, 1);
        method.visit_jump_insn(GOTO, caught);
        method.visit_label(caught);
        method.visit_var_insn(ILOAD, 0);
        method.visit_insn(ICONST_5);
        method.visit_jump_insn(IF_ICMPLE, done);
        method.visit_var_insn(ALOAD, 1);
        method.visit_insn(ATHROW);
        method.visit_label(done);
        method.visit_insn(ICONST_0);
        method.visit_insn(IRETURN);
        method.visit_end();
    }
    writer.visit_end();
    let bytes = writer.to_bytes().unwrap();

    let code = method_code(&bytes, "f").unwrap();
    let table = &code.attributes["StackMapTable"];
    assert_eq!(&table[..2], [0, 4]);
    // handlers at 4 and 8: SAME_LOCALS_1_STACK_ITEM with the caught type
    assert_eq!(&table[2..4], [64 + 4, 7]);
    assert_eq!(&table[6..8], [64 + 3, 7]);
    // join at 12: APPEND one object local
    assert_eq!(&table[10..14], [252, 0, 3, 7]);
    // SAME frame at 19
    assert_eq!(table[16], 6);

    let reader = ClassReader::new(&bytes).unwrap();
    let pool = reader.constant_pool();
    let local = u16::from_be_bytes([table[14], table[15]]);
    assert_eq!(pool.class_name(local).unwrap(), "java/lang/RuntimeException");
    let illegal = u16::from_be_bytes([table[4], table[5]]);
    assert_eq!(
        pool.class_name(illegal).unwrap(),
        "java/lang/IllegalArgumentException"
    );
}
