//! Opcode numbers and per-opcode properties of JVM bytecode
//!
//! Opcodes are plain `u8` constants since that is how they travel through the visitor protocol
//! and how they are laid out in a `Code` attribute.

pub const NOP: u8 = 0;
pub const ACONST_NULL: u8 = 1;
pub const ICONST_M1: u8 = 2;
pub const ICONST_0: u8 = 3;
pub const ICONST_1: u8 = 4;
pub const ICONST_2: u8 = 5;
pub const ICONST_3: u8 = 6;
pub const ICONST_4: u8 = 7;
pub const ICONST_5: u8 = 8;
pub const LCONST_0: u8 = 9;
pub const LCONST_1: u8 = 10;
pub const FCONST_0: u8 = 11;
pub const FCONST_1: u8 = 12;
pub const FCONST_2: u8 = 13;
pub const DCONST_0: u8 = 14;
pub const DCONST_1: u8 = 15;
pub const BIPUSH: u8 = 16;
pub const SIPUSH: u8 = 17;
pub const LDC: u8 = 18;
pub const LDC_W: u8 = 19;
pub const LDC2_W: u8 = 20;
pub const ILOAD: u8 = 21;
pub const LLOAD: u8 = 22;
pub const FLOAD: u8 = 23;
pub const DLOAD: u8 = 24;
pub const ALOAD: u8 = 25;
pub const ILOAD_0: u8 = 26;
pub const ILOAD_1: u8 = 27;
pub const ILOAD_2: u8 = 28;
pub const ILOAD_3: u8 = 29;
pub const LLOAD_0: u8 = 30;
pub const LLOAD_1: u8 = 31;
pub const LLOAD_2: u8 = 32;
pub const LLOAD_3: u8 = 33;
pub const FLOAD_0: u8 = 34;
pub const FLOAD_1: u8 = 35;
pub const FLOAD_2: u8 = 36;
pub const FLOAD_3: u8 = 37;
pub const DLOAD_0: u8 = 38;
pub const DLOAD_1: u8 = 39;
pub const DLOAD_2: u8 = 40;
pub const DLOAD_3: u8 = 41;
pub const ALOAD_0: u8 = 42;
pub const ALOAD_1: u8 = 43;
pub const ALOAD_2: u8 = 44;
pub const ALOAD_3: u8 = 45;
pub const IALOAD: u8 = 46;
pub const LALOAD: u8 = 47;
pub const FALOAD: u8 = 48;
pub const DALOAD: u8 = 49;
pub const AALOAD: u8 = 50;
pub const BALOAD: u8 = 51;
pub const CALOAD: u8 = 52;
pub const SALOAD: u8 = 53;
pub const ISTORE: u8 = 54;
pub const LSTORE: u8 = 55;
pub const FSTORE: u8 = 56;
pub const DSTORE: u8 = 57;
pub const ASTORE: u8 = 58;
pub const ISTORE_0: u8 = 59;
pub const ISTORE_1: u8 = 60;
pub const ISTORE_2: u8 = 61;
pub const ISTORE_3: u8 = 62;
pub const LSTORE_0: u8 = 63;
pub const LSTORE_1: u8 = 64;
pub const LSTORE_2: u8 = 65;
pub const LSTORE_3: u8 = 66;
pub const FSTORE_0: u8 = 67;
pub const FSTORE_1: u8 = 68;
pub const FSTORE_2: u8 = 69;
pub const FSTORE_3: u8 = 70;
pub const DSTORE_0: u8 = 71;
pub const DSTORE_1: u8 = 72;
pub const DSTORE_2: u8 = 73;
pub const DSTORE_3: u8 = 74;
pub const ASTORE_0: u8 = 75;
pub const ASTORE_1: u8 = 76;
pub const ASTORE_2: u8 = 77;
pub const ASTORE_3: u8 = 78;
pub const IASTORE: u8 = 79;
pub const LASTORE: u8 = 80;
pub const FASTORE: u8 = 81;
pub const DASTORE: u8 = 82;
pub const AASTORE: u8 = 83;
pub const BASTORE: u8 = 84;
pub const CASTORE: u8 = 85;
pub const SASTORE: u8 = 86;
pub const POP: u8 = 87;
pub const POP2: u8 = 88;
pub const DUP: u8 = 89;
pub const DUP_X1: u8 = 90;
pub const DUP_X2: u8 = 91;
pub const DUP2: u8 = 92;
pub const DUP2_X1: u8 = 93;
pub const DUP2_X2: u8 = 94;
pub const SWAP: u8 = 95;
pub const IADD: u8 = 96;
pub const LADD: u8 = 97;
pub const FADD: u8 = 98;
pub const DADD: u8 = 99;
pub const ISUB: u8 = 100;
pub const LSUB: u8 = 101;
pub const FSUB: u8 = 102;
pub const DSUB: u8 = 103;
pub const IMUL: u8 = 104;
pub const LMUL: u8 = 105;
pub const FMUL: u8 = 106;
pub const DMUL: u8 = 107;
pub const IDIV: u8 = 108;
pub const LDIV: u8 = 109;
pub const FDIV: u8 = 110;
pub const DDIV: u8 = 111;
pub const IREM: u8 = 112;
pub const LREM: u8 = 113;
pub const FREM: u8 = 114;
pub const DREM: u8 = 115;
pub const INEG: u8 = 116;
pub const LNEG: u8 = 117;
pub const FNEG: u8 = 118;
pub const DNEG: u8 = 119;
pub const ISHL: u8 = 120;
pub const LSHL: u8 = 121;
pub const ISHR: u8 = 122;
pub const LSHR: u8 = 123;
pub const IUSHR: u8 = 124;
pub const LUSHR: u8 = 125;
pub const IAND: u8 = 126;
pub const LAND: u8 = 127;
pub const IOR: u8 = 128;
pub const LOR: u8 = 129;
pub const IXOR: u8 = 130;
pub const LXOR: u8 = 131;
pub const IINC: u8 = 132;
pub const I2L: u8 = 133;
pub const I2F: u8 = 134;
pub const I2D: u8 = 135;
pub const L2I: u8 = 136;
pub const L2F: u8 = 137;
pub const L2D: u8 = 138;
pub const F2I: u8 = 139;
pub const F2L: u8 = 140;
pub const F2D: u8 = 141;
pub const D2I: u8 = 142;
pub const D2L: u8 = 143;
pub const D2F: u8 = 144;
pub const I2B: u8 = 145;
pub const I2C: u8 = 146;
pub const I2S: u8 = 147;
pub const LCMP: u8 = 148;
pub const FCMPL: u8 = 149;
pub const FCMPG: u8 = 150;
pub const DCMPL: u8 = 151;
pub const DCMPG: u8 = 152;
pub const IFEQ: u8 = 153;
pub const IFNE: u8 = 154;
pub const IFLT: u8 = 155;
pub const IFGE: u8 = 156;
pub const IFGT: u8 = 157;
pub const IFLE: u8 = 158;
pub const IF_ICMPEQ: u8 = 159;
pub const IF_ICMPNE: u8 = 160;
pub const IF_ICMPLT: u8 = 161;
pub const IF_ICMPGE: u8 = 162;
pub const IF_ICMPGT: u8 = 163;
pub const IF_ICMPLE: u8 = 164;
pub const IF_ACMPEQ: u8 = 165;
pub const IF_ACMPNE: u8 = 166;
pub const GOTO: u8 = 167;
pub const JSR: u8 = 168;
pub const RET: u8 = 169;
pub const TABLESWITCH: u8 = 170;
pub const LOOKUPSWITCH: u8 = 171;
pub const IRETURN: u8 = 172;
pub const LRETURN: u8 = 173;
pub const FRETURN: u8 = 174;
pub const DRETURN: u8 = 175;
pub const ARETURN: u8 = 176;
pub const RETURN: u8 = 177;
pub const GETSTATIC: u8 = 178;
pub const PUTSTATIC: u8 = 179;
pub const GETFIELD: u8 = 180;
pub const PUTFIELD: u8 = 181;
pub const INVOKEVIRTUAL: u8 = 182;
pub const INVOKESPECIAL: u8 = 183;
pub const INVOKESTATIC: u8 = 184;
pub const INVOKEINTERFACE: u8 = 185;
pub const INVOKEDYNAMIC: u8 = 186;
pub const NEW: u8 = 187;
pub const NEWARRAY: u8 = 188;
pub const ANEWARRAY: u8 = 189;
pub const ARRAYLENGTH: u8 = 190;
pub const ATHROW: u8 = 191;
pub const CHECKCAST: u8 = 192;
pub const INSTANCEOF: u8 = 193;
pub const MONITORENTER: u8 = 194;
pub const MONITOREXIT: u8 = 195;
pub const WIDE: u8 = 196;
pub const MULTIANEWARRAY: u8 = 197;
pub const IFNULL: u8 = 198;
pub const IFNONNULL: u8 = 199;
pub const GOTO_W: u8 = 200;
pub const JSR_W: u8 = 201;

/// Array element type codes used as the operand of `newarray`
pub mod array_type {
    pub const T_BOOLEAN: u8 = 4;
    pub const T_CHAR: u8 = 5;
    pub const T_FLOAT: u8 = 6;
    pub const T_DOUBLE: u8 = 7;
    pub const T_BYTE: u8 = 8;
    pub const T_SHORT: u8 = 9;
    pub const T_INT: u8 = 10;
    pub const T_LONG: u8 = 11;
}

/// Net change in operand stack size for every opcode whose effect does not depend on operands
///
/// Entries for field accesses, invocations, `ldc2_w`, `multianewarray` and `wide` are zero: their
/// effect depends on a descriptor or a dimension count and is computed where they are visited.
const STACK_SIZE_DELTA: [i8; 202] = [
    0, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 1, 1, 1, 2, 2,
    1, 1, 1, 0, 0, 1, 2, 1, 2, 1, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, -1, 0,
    -1, 0, -1, -1, -1, -1, -1, -2, -1, -2, -1, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, -3,
    -4, -3, -4, -3, -3, -3, -3, -1, -2, 1, 1, 1, 2, 2, 2, 0,
    -1, -2, -1, -2, -1, -2, -1, -2, -1, -2, -1, -2, -1, -2, -1, -2,
    -1, -2, -1, -2, 0, 0, 0, 0, -1, -1, -1, -1, -1, -1, -1, -2,
    -1, -2, -1, -2, 0, 1, 0, 1, -1, -1, 0, 0, 1, 1, -1, 0,
    -1, 0, 0, 0, -3, -1, -1, -3, -3, -1, -1, -1, -1, -1, -1, -2,
    -2, -2, -2, -2, -2, -2, -2, 0, 1, 0, -1, -1, -1, -2, -1, -2,
    -1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0,
    0, 0, -1, -1, 0, 0, -1, -1, 0, 0,
];

pub fn stack_size_delta(opcode: u8) -> i32 {
    STACK_SIZE_DELTA
        .get(opcode as usize)
        .map_or(0, |delta| *delta as i32)
}

/// Operand layout of an instruction, which is what the class reader needs to walk a `Code`
/// attribute
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum InsnKind {
    /// No operands
    NoArg,

    /// Signed byte (`bipush`, `newarray`)
    SignedByte,

    /// Signed short (`sipush`)
    SignedShort,

    /// Local variable index byte (`iload`, `ret`, ...)
    Var,

    /// Local variable index implied by the opcode (`iload_0`, `astore_3`, ...)
    ImplicitVar,

    /// Class constant index (`new`, `checkcast`, ...)
    Type,

    /// Field or method reference index
    FieldOrMethod,

    /// `invokeinterface`: reference index, argument count and a zero byte
    InterfaceMethod,

    /// `invokedynamic`: call site index and two zero bytes
    InvokeDynamic,

    /// 16-bit branch offset
    Label,

    /// 32-bit branch offset (`goto_w`, `jsr_w`)
    WideLabel,

    /// One byte constant index (`ldc`)
    Ldc,

    /// Two byte constant index (`ldc_w`, `ldc2_w`)
    LdcWide,

    /// Local variable index byte and signed increment byte
    Iinc,

    TableSwitch,
    LookupSwitch,

    /// Class constant index and a dimension byte
    MultiANewArray,

    /// Prefix which widens the following instruction
    Wide,
}

impl InsnKind {
    pub fn of(opcode: u8) -> InsnKind {
        match opcode {
            BIPUSH | NEWARRAY => InsnKind::SignedByte,
            SIPUSH => InsnKind::SignedShort,
            LDC => InsnKind::Ldc,
            LDC_W | LDC2_W => InsnKind::LdcWide,
            ILOAD..=ALOAD | ISTORE..=ASTORE | RET => InsnKind::Var,
            ILOAD_0..=ALOAD_3 | ISTORE_0..=ASTORE_3 => InsnKind::ImplicitVar,
            IINC => InsnKind::Iinc,
            IFEQ..=JSR | IFNULL | IFNONNULL => InsnKind::Label,
            GOTO_W | JSR_W => InsnKind::WideLabel,
            TABLESWITCH => InsnKind::TableSwitch,
            LOOKUPSWITCH => InsnKind::LookupSwitch,
            GETSTATIC..=INVOKESTATIC => InsnKind::FieldOrMethod,
            INVOKEINTERFACE => InsnKind::InterfaceMethod,
            INVOKEDYNAMIC => InsnKind::InvokeDynamic,
            NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => InsnKind::Type,
            WIDE => InsnKind::Wide,
            MULTIANEWARRAY => InsnKind::MultiANewArray,
            _ => InsnKind::NoArg,
        }
    }
}

/// Conditional jumps come in pairs whose conditions negate each other (`ifeq`/`ifne`, ...)
///
/// Returns the opcode of the negated jump.
pub fn invert_jump(opcode: u8) -> u8 {
    match opcode {
        IFNULL => IFNONNULL,
        IFNONNULL => IFNULL,
        _ => ((opcode + 1) ^ 1) - 1,
    }
}

pub fn is_return(opcode: u8) -> bool {
    (IRETURN..=RETURN).contains(&opcode)
}

/// Lower case name of every opcode, as used in disassembly listings
const MNEMONICS: [&str; 202] = [
    "nop", "aconst_null", "iconst_m1", "iconst_0", "iconst_1", "iconst_2", "iconst_3", "iconst_4",
    "iconst_5", "lconst_0", "lconst_1", "fconst_0", "fconst_1", "fconst_2", "dconst_0", "dconst_1",
    "bipush", "sipush", "ldc", "ldc_w", "ldc2_w", "iload", "lload", "fload", "dload", "aload",
    "iload_0", "iload_1", "iload_2", "iload_3", "lload_0", "lload_1", "lload_2", "lload_3",
    "fload_0", "fload_1", "fload_2", "fload_3", "dload_0", "dload_1", "dload_2", "dload_3",
    "aload_0", "aload_1", "aload_2", "aload_3", "iaload", "laload", "faload", "daload", "aaload",
    "baload", "caload", "saload", "istore", "lstore", "fstore", "dstore", "astore", "istore_0",
    "istore_1", "istore_2", "istore_3", "lstore_0", "lstore_1", "lstore_2", "lstore_3", "fstore_0",
    "fstore_1", "fstore_2", "fstore_3", "dstore_0", "dstore_1", "dstore_2", "dstore_3", "astore_0",
    "astore_1", "astore_2", "astore_3", "iastore", "lastore", "fastore", "dastore", "aastore",
    "bastore", "castore", "sastore", "pop", "pop2", "dup", "dup_x1", "dup_x2", "dup2", "dup2_x1",
    "dup2_x2", "swap", "iadd", "ladd", "fadd", "dadd", "isub", "lsub", "fsub", "dsub", "imul",
    "lmul", "fmul", "dmul", "idiv", "ldiv", "fdiv", "ddiv", "irem", "lrem", "frem", "drem", "ineg",
    "lneg", "fneg", "dneg", "ishl", "lshl", "ishr", "lshr", "iushr", "lushr", "iand", "land",
    "ior", "lor", "ixor", "lxor", "iinc", "i2l", "i2f", "i2d", "l2i", "l2f", "l2d", "f2i", "f2l",
    "f2d", "d2i", "d2l", "d2f", "i2b", "i2c", "i2s", "lcmp", "fcmpl", "fcmpg", "dcmpl", "dcmpg",
    "ifeq", "ifne", "iflt", "ifge", "ifgt", "ifle", "if_icmpeq", "if_icmpne", "if_icmplt",
    "if_icmpge", "if_icmpgt", "if_icmple", "if_acmpeq", "if_acmpne", "goto", "jsr", "ret",
    "tableswitch", "lookupswitch", "ireturn", "lreturn", "freturn", "dreturn", "areturn", "return",
    "getstatic", "putstatic", "getfield", "putfield", "invokevirtual", "invokespecial",
    "invokestatic", "invokeinterface", "invokedynamic", "new", "newarray", "anewarray",
    "arraylength", "athrow", "checkcast", "instanceof", "monitorenter", "monitorexit", "wide",
    "multianewarray", "ifnull", "ifnonnull", "goto_w", "jsr_w",
];

/// Name of an opcode (`"<unknown>"` for unassigned opcode numbers)
pub fn mnemonic(opcode: u8) -> &'static str {
    MNEMONICS
        .get(opcode as usize)
        .copied()
        .unwrap_or("<unknown>")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stack_deltas() {
        assert_eq!(stack_size_delta(NOP), 0);
        assert_eq!(stack_size_delta(ICONST_1), 1);
        assert_eq!(stack_size_delta(LCONST_0), 2);
        assert_eq!(stack_size_delta(POP2), -2);
        assert_eq!(stack_size_delta(IF_ICMPEQ), -2);
        assert_eq!(stack_size_delta(DUP2_X2), 2);
        assert_eq!(stack_size_delta(LASTORE), -4);
        assert_eq!(stack_size_delta(GETFIELD), 0);
        assert_eq!(stack_size_delta(RETURN), 0);
        assert_eq!(stack_size_delta(IRETURN), -1);
        assert_eq!(stack_size_delta(JSR), 1);
    }

    #[test]
    fn operand_layouts() {
        assert_eq!(InsnKind::of(ALOAD), InsnKind::Var);
        assert_eq!(InsnKind::of(ALOAD_2), InsnKind::ImplicitVar);
        assert_eq!(InsnKind::of(RET), InsnKind::Var);
        assert_eq!(InsnKind::of(GOTO), InsnKind::Label);
        assert_eq!(InsnKind::of(IINC), InsnKind::Iinc);
        assert_eq!(InsnKind::of(INVOKESPECIAL), InsnKind::FieldOrMethod);
        assert_eq!(InsnKind::of(ATHROW), InsnKind::NoArg);
        assert_eq!(InsnKind::of(IASTORE), InsnKind::NoArg);
    }

    #[test]
    fn inverted_jumps() {
        assert_eq!(invert_jump(IFEQ), IFNE);
        assert_eq!(invert_jump(IFNE), IFEQ);
        assert_eq!(invert_jump(IF_ICMPLT), IF_ICMPGE);
        assert_eq!(invert_jump(IF_ACMPNE), IF_ACMPEQ);
        assert_eq!(invert_jump(IFNONNULL), IFNULL);
    }

    #[test]
    fn mnemonics_line_up() {
        assert_eq!(mnemonic(NOP), "nop");
        assert_eq!(mnemonic(ILOAD_0), "iload_0");
        assert_eq!(mnemonic(IINC), "iinc");
        assert_eq!(mnemonic(INVOKEDYNAMIC), "invokedynamic");
        assert_eq!(mnemonic(JSR_W), "jsr_w");
        assert_eq!(mnemonic(0xCA), "<unknown>");
    }
}
