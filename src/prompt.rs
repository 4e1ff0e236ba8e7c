//! Prompt templates sent to the model.
//!
//! Both prompts ask the model to append two marker-delimited sections after the
//! code: a description of what changed and one recommendation for follow-up
//! work. The markers are extracted by [`crate::response::extract_section`].

/// Opening marker of the "changes" section.
pub const CHANGES_START: &str = "CHANGES_START";
/// Closing marker of the "changes" section.
pub const CHANGES_END: &str = "CHANGES_END";
/// Opening marker of the "next steps" section.
pub const NEXT_STEPS_START: &str = "NEXT_STEPS_START";
/// Closing marker of the "next steps" section.
pub const NEXT_STEPS_END: &str = "NEXT_STEPS_END";

const REFACTOR_PROMPT: &str = "
Refactor this code to improve its efficiency, readability, and maintainability while keeping the functionality unchanged.
Ensure:
1. The refactored code is more efficient and optimized.
2. Add comments in the code where significant changes were made.

After the code, provide:
CHANGES_START
- [specific change description 1]
CHANGES_END

NEXT_STEPS_START
- [one concise recommendation for future improvement]
NEXT_STEPS_END
";

const GENERATE_TESTS_PROMPT: &str = "
Create a comprehensive unit test case for the provided code.
Ensure:
1. The tests cover all edge cases and core functionality.

After the test code, provide:
CHANGES_START
- [test coverage description]
CHANGES_END

NEXT_STEPS_START
- [one concise recommendation for test improvement]
NEXT_STEPS_END
";

/// Kind of request sent to the model for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Refactor the file for efficiency and readability
    Refactor,
    /// Generate unit tests for the file
    GenerateTests,
}

impl PromptKind {
    /// Returns the ID string for this prompt.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Refactor => "refactor",
            Self::GenerateTests => "generate-tests",
        }
    }

    /// Returns the prompt text prepended to the file content.
    #[must_use]
    pub const fn template(self) -> &'static str {
        match self {
            Self::Refactor => REFACTOR_PROMPT,
            Self::GenerateTests => GENERATE_TESTS_PROMPT,
        }
    }
}

impl std::fmt::Display for PromptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
