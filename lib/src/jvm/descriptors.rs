//! Helpers over raw field and method descriptor strings

/// Slot sizes of a method's arguments and return value packed into one number
///
/// The argument size (including an implicit `this` slot) sits in the high bits, shifted left by
/// 2, and the return size (0, 1 or 2) is in the low 2 bits. This is computed directly from the
/// descriptor bytes since it runs for every invocation the writer sees.
pub fn argument_and_return_sizes(descriptor: &str) -> u32 {
    let bytes = descriptor.as_bytes();
    let mut arg_size: u32 = 1;
    let mut i = 1;

    while let Some(&c) = bytes.get(i) {
        i += 1;
        match c {
            b')' => {
                let ret_size = match bytes.get(i) {
                    Some(b'V') => 0,
                    Some(b'J' | b'D') => 2,
                    _ => 1,
                };
                return arg_size << 2 | ret_size;
            }
            b'L' => {
                while bytes.get(i).map_or(false, |b| *b != b';') {
                    i += 1;
                }
                i += 1;
                arg_size += 1;
            }
            b'[' => {
                while bytes.get(i) == Some(&b'[') {
                    i += 1;
                }
                if bytes.get(i) == Some(&b'L') {
                    while bytes.get(i).map_or(false, |b| *b != b';') {
                        i += 1;
                    }
                }
                i += 1;
                arg_size += 1;
            }
            b'J' | b'D' => arg_size += 2,
            _ => arg_size += 1,
        }
    }
    arg_size << 2
}

/// Return type part of a method descriptor (everything after the `)`)
pub fn return_type(descriptor: &str) -> &str {
    descriptor
        .rfind(')')
        .map_or(descriptor, |idx| &descriptor[idx + 1..])
}

/// Split a descriptor's parameter list into one descriptor per parameter
///
/// No validation is done beyond what is needed to find the parameter boundaries.
pub fn parameter_types(descriptor: &str) -> Vec<&str> {
    let bytes = descriptor.as_bytes();
    let mut parameters = vec![];
    let mut i = 1;

    while let Some(&c) = bytes.get(i) {
        if c == b')' {
            break;
        }
        let start = i;
        while bytes.get(i) == Some(&b'[') {
            i += 1;
        }
        if bytes.get(i) == Some(&b'L') {
            while bytes.get(i).map_or(false, |b| *b != b';') {
                i += 1;
            }
        }
        i += 1;
        parameters.push(&descriptor[start..i.min(descriptor.len())]);
    }
    parameters
}

/// Internal name of the class in an object descriptor, or the descriptor itself for arrays
///
/// `Ljava/lang/String;` becomes `java/lang/String`, `[I` stays `[I`.
pub fn internal_name(descriptor: &str) -> &str {
    match descriptor.strip_prefix('L') {
        Some(rest) => rest.strip_suffix(';').unwrap_or(rest),
        None => descriptor,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn packed_sizes() {
        assert_eq!(argument_and_return_sizes("()V"), 1 << 2);
        assert_eq!(argument_and_return_sizes("(IJ)D"), 4 << 2 | 2);
        assert_eq!(
            argument_and_return_sizes("([[Ljava/lang/String;[JLjava/lang/Object;)I"),
            4 << 2 | 1
        );
    }

    #[test]
    fn descriptor_pieces() {
        assert_eq!(return_type("(IJ)[Ljava/lang/Object;"), "[Ljava/lang/Object;");
        assert_eq!(
            parameter_types("(I[[JLjava/lang/String;Z)V"),
            vec!["I", "[[J", "Ljava/lang/String;", "Z"]
        );
        assert_eq!(internal_name("Ljava/lang/String;"), "java/lang/String");
        assert_eq!(internal_name("[I"), "[I");
    }
}
