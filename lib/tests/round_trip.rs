mod common;

use classweave::jvm::opcodes::*;
use classweave::jvm::*;
use common::*;

fn lambda_metafactory() -> MethodHandle {
    MethodHandle {
        kind: HandleKind::InvokeStatic,
        owner: String::from("java/lang/invoke/LambdaMetafactory"),
        name: String::from("metafactory"),
        descriptor: String::from(
            "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;\
             Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;\
             Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)\
             Ljava/lang/invoke/CallSite;",
        ),
        interface: false,
    }
}

/// A class exercising most of the visitor protocol
fn sample_class() -> Vec<u8> {
    let mut writer = ClassWriter::new(WriterOptions::default());
    writer.visit(
        Version::JAVA11,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        "demo/Shapes",
        None,
        Some("java/lang/Object"),
        &["java/lang/Runnable"],
    );
    writer.visit_source(Some("Shapes.java"), None);
    writer.visit_nest_member("demo/Shapes$Corner");
    if let Some(mut annotation) = writer.visit_annotation("Ldemo/Tag;") {
        annotation.visit(Some("name"), &AnnotationValue::String(String::from("shapes")));
        annotation.visit(Some("sizes"), &AnnotationValue::IntArray(vec![1, 2, 3]));
        annotation.visit_enum(Some("kind"), "Ldemo/Kind;", "ROUND");
        if let Some(mut array) = annotation.visit_array(Some("types")) {
            array.visit(None, &AnnotationValue::Class(String::from("Ljava/lang/String;")));
            array.visit_end();
        }
        annotation.visit_end();
    }
    writer.visit_inner_class(
        "demo/Shapes$Corner",
        Some("demo/Shapes"),
        Some("Corner"),
        InnerClassAccessFlags::STATIC | InnerClassAccessFlags::PUBLIC,
    );

    writer.visit_field(
        FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
        "SIZE",
        "I",
        None,
        Some(&ConstantValue::Integer(3)),
    );
    if let Some(mut field) = writer.visit_field(
        FieldAccessFlags::PUBLIC | FieldAccessFlags::DEPRECATED,
        "names",
        "Ljava/util/List;",
        Some("Ljava/util/List<Ljava/lang/String;>;"),
        None,
    ) {
        field.visit_annotation("Ldemo/Tag;");
        field.visit_end();
    }

    if let Some(mut init) =
        writer.visit_method(MethodAccessFlags::PUBLIC, "<init>", "()V", None, &[])
    {
        init.visit_var_insn(ALOAD, 0);
        init.visit_method_insn(INVOKESPECIAL, "java/lang/Object", "<init>", "()V", false);
        init.visit_insn(RETURN);
        init.visit_end();
    }

    if let Some(mut pick) = writer.visit_method(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "pick",
        "(I)Ljava/lang/String;",
        None,
        &["java/io/IOException"],
    ) {
        let start = Label::new();
        let zero = Label::new();
        let one = Label::new();
        let other = Label::new();
        let end = Label::new();
        pick.visit_label(start);
        pick.visit_line_number(10, start);
        pick.visit_var_insn(ILOAD, 0);
        pick.visit_table_switch_insn(0, 1, other, &[zero, one]);
        pick.visit_label(zero);
        pick.visit_ldc_insn(&ConstantValue::String(String::from("zero")));
        pick.visit_insn(ARETURN);
        pick.visit_label(one);
        pick.visit_ldc_insn(&ConstantValue::String(String::from("one")));
        pick.visit_insn(ARETURN);
        pick.visit_label(other);
        pick.visit_var_insn(ILOAD, 0);
        pick.visit_lookup_switch_insn(end, &[-1, 100], &[zero, one]);
        pick.visit_label(end);
        pick.visit_type_insn(NEW, "java/lang/IllegalStateException");
        pick.visit_insn(DUP);
        pick.visit_method_insn(
            INVOKESPECIAL,
            "java/lang/IllegalStateException",
            "<init>",
            "()V",
            false,
        );
        pick.visit_insn(ATHROW);
        pick.visit_local_variable("n", "I", None, start, end, 0);
        pick.visit_max_stack(0);
        pick.visit_end();
    }

    if let Some(mut run) = writer.visit_method(MethodAccessFlags::PUBLIC, "run", "()V", None, &[])
    {
        let start = Label::new();
        let end = Label::new();
        let handler = Label::new();
        let after = Label::new();
        run.visit_try_catch_block(start, end, handler, Some("java/lang/ArithmeticException"));
        run.visit_label(start);
        run.visit_ldc_insn(&ConstantValue::Long(1 << 40));
        run.visit_ldc_insn(&ConstantValue::Long(0));
        run.visit_insn(LDIV);
        run.visit_var_insn(LSTORE, 1);
        run.visit_label(end);
        run.visit_jump_insn(GOTO, after);
        run.visit_label(handler);
        run.visit_var_insn(ASTORE, 1);
        run.visit_label(after);
        run.visit_invoke_dynamic_insn(
            "run",
            "()Ljava/lang/Runnable;",
            &lambda_metafactory(),
            &[
                ConstantValue::MethodType(String::from("()V")),
                ConstantValue::MethodHandle(MethodHandle {
                    kind: HandleKind::InvokeStatic,
                    owner: String::from("demo/Shapes"),
                    name: String::from("lambda$run$0"),
                    descriptor: String::from("()V"),
                    interface: false,
                }),
                ConstantValue::MethodType(String::from("()V")),
            ],
        );
        run.visit_method_insn(INVOKEINTERFACE, "java/lang/Runnable", "run", "()V", true);
        run.visit_int_insn(SIPUSH, 1000);
        run.visit_int_insn(NEWARRAY, array_type::T_INT as i32);
        run.visit_insn(POP);
        run.visit_insn(ICONST_0);
        run.visit_var_insn(ISTORE, 3);
        run.visit_iinc_insn(3, 1000);
        run.visit_field_insn(GETSTATIC, "java/lang/System", "out", "Ljava/io/PrintStream;");
        run.visit_insn(POP);
        run.visit_insn(ICONST_2);
        run.visit_insn(ICONST_3);
        run.visit_multi_anew_array_insn("[[I", 2);
        run.visit_insn(POP);
        run.visit_insn(RETURN);
        run.visit_end();
    }

    if let Some(mut lambda) = writer.visit_method(
        MethodAccessFlags::PRIVATE | MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC,
        "lambda$run$0",
        "()V",
        None,
        &[],
    ) {
        lambda.visit_insn(RETURN);
        lambda.visit_end();
    }

    writer.visit_end();
    writer.to_bytes().unwrap()
}

#[test]
fn rewriting_preserves_events() {
    let original = sample_class();
    let mut writer = ClassWriter::new(WriterOptions::default());
    ClassReader::new(&original)
        .unwrap()
        .accept(&mut writer, ReaderFlags::default())
        .unwrap();
    let rewritten = writer.to_bytes().unwrap();

    assert_eq!(EventLog::of(&original), EventLog::of(&rewritten));
}

/// Class attributes are written back in this writer's order, so only classes it produced
/// itself come back byte for byte
#[test]
fn copying_a_written_class_through_its_reader_is_byte_identical() {
    let original = sample_class();
    let reader = ClassReader::new(&original).unwrap();
    let mut writer =
        ClassWriter::from_reader(&reader, WriterOptions::default(), SuperClassMap::new()).unwrap();
    reader.accept(&mut writer, ReaderFlags::default()).unwrap();
    let copied = writer.to_bytes().unwrap();

    assert_eq!(original, copied);
}

#[test]
fn events_of_the_sample() {
    let events = EventLog::of(&sample_class());
    assert!(events[0].starts_with("class 55.0"));
    assert_eq!(events[1], "source Some(\"Shapes.java\") None");
    assert!(events.contains(&String::from(" ldc Long(1099511627776)")));
    assert!(events.contains(&String::from(" iinc 3 1000")));
    assert!(events.contains(&String::from("  Some(\"sizes\") = IntArray([1, 2, 3])")));
    assert!(events
        .iter()
        .any(|event| event.starts_with("field PUBLIC | DEPRECATED names")));
    assert_eq!(events.last().map(String::as_str), Some("end"));
}

#[test]
fn skipping_code_and_debug_information() {
    let original = sample_class();
    let mut log = EventLog::default();
    ClassReader::new(&original)
        .unwrap()
        .accept(&mut log, ReaderFlags::SKIP_CODE | ReaderFlags::SKIP_DEBUG)
        .unwrap();
    assert!(!log.events.iter().any(|event| event.starts_with("source")));
    assert!(!log.events.iter().any(|event| event.starts_with(" insn")));
    assert!(log.events.iter().any(|event| event.starts_with("method")));
}

#[test]
fn unrelated_classes_meet_at_a_join() {
    let mut writer = class_writer("G", Version::JAVA8, FrameComputation::Auto);
    if let Some(mut method) = writer.visit_method(
        MethodAccessFlags::STATIC,
        "either",
        "(Z)Ljava/lang/Object;",
        None,
        &[],
    ) {
        let other = Label::new();
        let join = Label::new();
        method.visit_var_insn(ILOAD, 0);
        method.visit_jump_insn(IFEQ, other);
        method.visit_insn(ACONST_NULL);
        method.visit_type_insn(CHECKCAST, "demo/Left");
        method.visit_jump_insn(GOTO, join);
        method.visit_label(other);
        method.visit_insn(ACONST_NULL);
        method.visit_type_insn(CHECKCAST, "demo/Right");
        method.visit_label(join);
        method.visit_insn(ARETURN);
        method.visit_end();
    }
    writer.visit_end();
    let bytes = writer.to_bytes().unwrap();

    let code = method_code(&bytes, "either").unwrap();
    assert_eq!(code.max_stack, 1);
    assert!(code.attributes.contains_key("StackMapTable"));
}

#[test]
fn copied_methods_keep_debug_tables_when_skipping_debug() {
    let original = sample_class();
    let reader = ClassReader::new(&original).unwrap();
    let mut writer =
        ClassWriter::from_reader(&reader, WriterOptions::default(), SuperClassMap::new()).unwrap();
    reader.accept(&mut writer, ReaderFlags::SKIP_DEBUG).unwrap();
    let copied = writer.to_bytes().unwrap();

    let pick = method_code(&copied, "pick").unwrap();
    assert!(pick.attributes.contains_key("LineNumberTable"));
    assert!(pick.attributes.contains_key("LocalVariableTable"));

    // Without copying, the tables are left out
    let mut writer = ClassWriter::new(WriterOptions::default());
    reader.accept(&mut writer, ReaderFlags::SKIP_DEBUG).unwrap();
    let rewritten = writer.to_bytes().unwrap();
    let pick = method_code(&rewritten, "pick").unwrap();
    assert!(!pick.attributes.contains_key("LineNumberTable"));
    assert!(!pick.attributes.contains_key("LocalVariableTable"));
}
