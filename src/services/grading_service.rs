use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::models::question::UNATTEMPTED;
use crate::models::test::Test;
use crate::models::test_session::{Answer, Outcome};

/// Two decimal places, half away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerTally {
    pub correct_answers: i32,
    pub wrong_answers: i32,
    pub unattempted: i32,
}

impl AnswerTally {
    /// Rebuilds the counts from stored answers, one slot per test question.
    /// Answers that reference no question of the test are not counted.
    pub fn from_answers(test: &Test, answers: &[Answer]) -> Self {
        let mut tally = Self::default();
        for question in &test.questions {
            let stored = answers.iter().find(|a| a.question_id == question.id);
            match stored {
                Some(a) if !a.is_unattempted() && a.is_correct == Some(true) => {
                    tally.correct_answers += 1
                }
                Some(a) if !a.is_unattempted() && a.is_correct == Some(false) => {
                    tally.wrong_answers += 1
                }
                _ => tally.unattempted += 1,
            }
        }
        tally
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSheet {
    pub answers: Vec<Answer>,
    pub tally: AnswerTally,
    pub score: Decimal,
    pub max_score: i32,
    pub percentage: Decimal,
}

impl ScoreSheet {
    pub fn into_outcome(self) -> Outcome {
        Outcome {
            answers: self.answers,
            score: self.score,
            percentage: self.percentage,
        }
    }
}

pub struct GradingService;

impl GradingService {
    /// Grades a submission against the test's answer key. Every question of
    /// the test ends up with exactly one graded answer; missing ones are graded
    /// as unattempted.
    pub fn grade(test: &Test, answers: &[Answer]) -> ScoreSheet {
        let penalty = -test.negative_marking_ratio;
        let mut submitted: HashMap<Uuid, &Answer> = HashMap::with_capacity(answers.len());
        let mut seen = HashSet::with_capacity(answers.len());
        let mut strays: Vec<Answer> = Vec::new();

        for answer in answers {
            if test.question(answer.question_id).is_none() {
                tracing::warn!(
                    test_id = %test.id,
                    question_id = %answer.question_id,
                    "answer references a question that is not part of the test; scoring it as zero"
                );
                strays.push(Answer {
                    is_correct: Some(false),
                    score_earned: Some(Decimal::ZERO),
                    ..Answer::new(answer.question_id, answer.chosen_option_index, answer.remark.clone())
                });
                continue;
            }
            if !seen.insert(answer.question_id) {
                tracing::warn!(
                    test_id = %test.id,
                    question_id = %answer.question_id,
                    "duplicate answer for question dropped"
                );
                continue;
            }
            submitted.insert(answer.question_id, answer);
        }

        let mut tally = AnswerTally::default();
        let mut raw = Decimal::ZERO;
        let mut graded = Vec::with_capacity(test.questions.len() + strays.len());

        for question in &test.questions {
            let (chosen, remark) = match submitted.get(&question.id) {
                Some(a) => (a.chosen_option_index, a.remark.clone()),
                None => (UNATTEMPTED, String::new()),
            };

            let (is_correct, earned) = if chosen == UNATTEMPTED {
                tally.unattempted += 1;
                (false, Decimal::ZERO)
            } else if question.is_correct(chosen) {
                tally.correct_answers += 1;
                (true, Decimal::ONE)
            } else {
                tally.wrong_answers += 1;
                (false, penalty)
            };

            raw += earned;
            graded.push(Answer {
                is_correct: Some(is_correct),
                score_earned: Some(earned),
                ..Answer::new(question.id, chosen, remark)
            });
        }
        graded.extend(strays);

        let max_score = test.max_score();
        ScoreSheet {
            answers: graded,
            tally,
            score: round2(raw),
            max_score,
            percentage: percentage_of(raw, max_score),
        }
    }

    /// Cut-off mark expressed on the percentage scale: `cutoff / max_score * 100`.
    pub fn qualification_threshold(cutoff_mark: Decimal, max_score: i32) -> Decimal {
        percentage_of(cutoff_mark, max_score)
    }

    pub fn is_qualified(percentage: Decimal, cutoff_mark: Decimal, max_score: i32) -> bool {
        percentage >= Self::qualification_threshold(cutoff_mark, max_score)
    }
}

fn percentage_of(value: Decimal, max_score: i32) -> Decimal {
    if max_score <= 0 {
        return Decimal::ZERO;
    }
    round2(value / Decimal::from(max_score) * Decimal::ONE_HUNDRED)
}
