use crate::jvm::analysis::Compute;
use crate::jvm::Version;
use std::str::FromStr;

/// How the writer derives `max_stack` and stack map frames for method bodies
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameComputation {
    /// Frames for class files which must have them (Java 7 onwards), maximum stack size only
    /// for older ones
    Auto,

    /// Only the maximum stack size, no stack map
    MaxStack,

    /// Always compute frames, writing the legacy `StackMap` attribute before Java 6
    Frames,
}

impl Default for FrameComputation {
    fn default() -> Self {
        FrameComputation::Auto
    }
}

impl FrameComputation {
    pub(crate) fn for_version(self, version: Version) -> Compute {
        match self {
            FrameComputation::Auto if version.requires_stack_map_frames() => Compute::Frames,
            FrameComputation::Auto | FrameComputation::MaxStack => Compute::MaxStack,
            FrameComputation::Frames => Compute::Frames,
        }
    }
}

impl FromStr for FrameComputation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(FrameComputation::Auto),
            "max-stack" => Ok(FrameComputation::MaxStack),
            "frames" => Ok(FrameComputation::Frames),
            other => Err(format!(
                "unknown frame computation '{}' (expected auto, max-stack or frames)",
                other
            )),
        }
    }
}

/// Settings of a [`crate::jvm::ClassWriter`]
#[derive(Copy, Clone, Debug, Default)]
pub struct WriterOptions {
    pub frames: FrameComputation,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn auto_follows_the_class_version() {
        let auto = FrameComputation::Auto;
        assert_eq!(auto.for_version(Version::JAVA8), Compute::Frames);
        assert_eq!(auto.for_version(Version::JAVA7), Compute::Frames);
        assert_eq!(auto.for_version(Version::JAVA6), Compute::MaxStack);
        assert_eq!(
            FrameComputation::Frames.for_version(Version::JAVA1_4),
            Compute::Frames
        );
        assert_eq!(
            FrameComputation::MaxStack.for_version(Version::JAVA17),
            Compute::MaxStack
        );
    }

    #[test]
    fn parse_from_command_line() {
        assert_eq!("max-stack".parse(), Ok(FrameComputation::MaxStack));
        assert!("everything".parse::<FrameComputation>().is_err());
    }
}
