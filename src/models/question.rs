use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Sentinel stored in an answer's chosen index when the candidate skipped the question.
pub const UNATTEMPTED: i32 = -1;

/// A multiple-choice item owned by a [`crate::models::test::Test`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_option_index: i32,
}

impl Question {
    pub fn new(
        question_text: impl Into<String>,
        options: Vec<String>,
        correct_option_index: i32,
    ) -> Result<Self> {
        let question = Self {
            id: Uuid::new_v4(),
            question_text: question_text.into(),
            options,
            correct_option_index,
        };
        question.validate()?;
        Ok(question)
    }

    pub fn validate(&self) -> Result<()> {
        if self.question_text.trim().is_empty() {
            return Err(Error::Validation("Question text cannot be empty".to_string()));
        }
        if self.options.len() < 2 {
            return Err(Error::Validation(format!(
                "Question '{}' must have at least two options",
                self.question_text
            )));
        }
        if self.correct_option_index < 0
            || self.correct_option_index as usize >= self.options.len()
        {
            return Err(Error::Validation(format!(
                "Correct answer index {} is out of bounds for {} options",
                self.correct_option_index,
                self.options.len()
            )));
        }
        Ok(())
    }

    pub fn is_correct(&self, chosen_option_index: i32) -> bool {
        chosen_option_index == self.correct_option_index
    }
}
