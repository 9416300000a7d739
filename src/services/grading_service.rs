use std::collections::HashMap;

use uuid::Uuid;

use crate::dto::student_dto::{AnswerInput, RecapAnswerInput};
use crate::models::assistance::RecapQuestion;
use crate::models::question::Question;
use crate::models::submission::Verdict;

/// Main-quiz passing grade. A perfect score passes independently of the
/// percentage threshold.
pub const PASSING_SCORE: i32 = 70;

#[derive(Debug, Clone)]
pub struct GradedAnswer {
    pub question_id: Uuid,
    pub answer_text: String,
    pub verdict: Verdict,
}

#[derive(Debug, Clone)]
pub struct AutoGradeOutcome {
    pub answers: Vec<GradedAnswer>,
    pub correct_count: i32,
    pub total_questions: i32,
    pub score: i32,
    /// Submitted question ids that matched no question in the quiz.
    pub unmatched_question_ids: Vec<Uuid>,
    pub has_indeterminate: bool,
}

impl AutoGradeOutcome {
    pub fn passed(&self) -> bool {
        self.score >= PASSING_SCORE
            || (self.total_questions > 0 && self.correct_count == self.total_questions)
    }
}

#[derive(Debug, Clone)]
pub struct RecapOutcome {
    pub correct_count: i32,
    pub total_questions: i32,
    pub passed: bool,
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub teacher_percentage: i32,
    pub auto_correct_percentage: i32,
    pub passed: bool,
}

pub struct GradingService;

impl GradingService {
    /// Grade a main-quiz submission against the quiz's questions.
    ///
    /// One verdict per quiz question: `Correct`/`Incorrect` by
    /// case- and whitespace-insensitive exact match, `Indeterminate` when
    /// the question carries no expected answer (never counted as wrong),
    /// `Incorrect` when the question was not answered at all. Answers that
    /// reference unknown question ids are collected, not dropped silently,
    /// and a bad answer never prevents the remaining questions from being
    /// graded.
    pub fn grade_main_quiz(questions: &[Question], answers: &[AnswerInput]) -> AutoGradeOutcome {
        let mut by_question: HashMap<Uuid, &AnswerInput> = HashMap::new();
        for answer in answers {
            by_question.entry(answer.question_id).or_insert(answer);
        }

        let mut graded = Vec::with_capacity(questions.len());
        let mut correct_count = 0;
        let mut has_indeterminate = false;

        for question in questions {
            let given = by_question.remove(&question.id);
            let answer_text = given.map(|a| a.answer_text.clone()).unwrap_or_default();
            let verdict = match question.grading_key() {
                None => {
                    has_indeterminate = true;
                    Verdict::Indeterminate
                }
                Some(expected) => match given {
                    Some(answer) if Self::answers_match(expected, &answer.answer_text) => {
                        correct_count += 1;
                        Verdict::Correct
                    }
                    _ => Verdict::Incorrect,
                },
            };
            graded.push(GradedAnswer {
                question_id: question.id,
                answer_text,
                verdict,
            });
        }

        // Whatever is left in the map pointed at no question in this quiz.
        let unmatched_question_ids: Vec<Uuid> = by_question.into_keys().collect();

        let total_questions = questions.len() as i32;
        AutoGradeOutcome {
            correct_count,
            total_questions,
            score: Self::percentage(correct_count, total_questions),
            answers: graded,
            unmatched_question_ids,
            has_indeterminate,
        }
    }

    /// Level-1 recap grading: pass only when every answer is correct.
    pub fn grade_recap(questions: &[RecapQuestion], answers: &[RecapAnswerInput]) -> RecapOutcome {
        let selected: HashMap<Uuid, i32> = answers
            .iter()
            .map(|a| (a.question_id, a.selected_option))
            .collect();

        let correct_count = questions
            .iter()
            .filter(|q| selected.get(&q.id) == Some(&q.correct_option))
            .count() as i32;
        let total_questions = questions.len() as i32;

        RecapOutcome {
            correct_count,
            total_questions,
            passed: total_questions > 0 && correct_count == total_questions,
        }
    }

    /// Merge teacher per-answer scores with the untouched auto-grade
    /// verdicts. Either path at or above the threshold passes: a teacher
    /// can upgrade a weak auto-score but never downgrade a submission the
    /// auto-grader already put at 70% or better.
    pub fn reconcile(teacher_scores: &[i32], verdicts: &[Verdict]) -> Reconciliation {
        let teacher_percentage = if teacher_scores.is_empty() {
            0
        } else {
            let sum: i64 = teacher_scores.iter().map(|&s| s as i64).sum();
            (sum as f64 / teacher_scores.len() as f64).round() as i32
        };

        let correct = verdicts.iter().filter(|v| v.is_correct()).count() as i32;
        let auto_correct_percentage = Self::percentage(correct, verdicts.len() as i32);

        Reconciliation {
            teacher_percentage,
            auto_correct_percentage,
            passed: teacher_percentage >= PASSING_SCORE
                || auto_correct_percentage >= PASSING_SCORE,
        }
    }

    pub fn answers_match(expected: &str, given: &str) -> bool {
        expected.trim().to_lowercase() == given.trim().to_lowercase()
    }

    pub fn percentage(correct: i32, total: i32) -> i32 {
        if total <= 0 {
            return 0;
        }
        (correct as f64 / total as f64 * 100.0).round() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(expected: Option<&str>) -> Question {
        Question {
            id: Uuid::new_v4(),
            quiz_id: Uuid::new_v4(),
            text: "q".to_string(),
            expected_answer: expected.map(str::to_string),
            image_url: None,
            ordinal: 0,
        }
    }

    fn answer(question_id: Uuid, text: &str) -> AnswerInput {
        AnswerInput {
            question_id,
            answer_text: text.to_string(),
        }
    }

    #[test]
    fn two_of_three_correct_fails_at_67() {
        let questions = vec![
            question(Some("4")),
            question(Some("Paris")),
            question(Some("Mercury")),
        ];
        let answers = vec![
            answer(questions[0].id, "4"),
            answer(questions[1].id, "Paris"),
            answer(questions[2].id, "Venus"),
        ];
        let outcome = GradingService::grade_main_quiz(&questions, &answers);
        assert_eq!(outcome.correct_count, 2);
        assert_eq!(outcome.score, 67);
        assert!(!outcome.passed());
    }

    #[test]
    fn all_correct_passes_via_escape_hatch() {
        let questions = vec![
            question(Some("4")),
            question(Some("Paris")),
            question(Some("Mercury")),
        ];
        let answers = vec![
            answer(questions[0].id, "4"),
            answer(questions[1].id, " paris "),
            answer(questions[2].id, "MERCURY"),
        ];
        let outcome = GradingService::grade_main_quiz(&questions, &answers);
        assert_eq!(outcome.score, 100);
        assert!(outcome.passed());
    }

    #[test]
    fn matching_is_case_and_whitespace_insensitive() {
        assert!(GradingService::answers_match("  Paris ", "paris"));
        assert!(GradingService::answers_match("4", " 4 "));
        assert!(!GradingService::answers_match("Paris", "Pariss"));
    }

    #[test]
    fn missing_expected_answer_is_indeterminate_not_wrong() {
        let questions = vec![question(Some("4")), question(None), question(Some("  "))];
        let answers = vec![
            answer(questions[0].id, "4"),
            answer(questions[1].id, "anything"),
            answer(questions[2].id, "anything"),
        ];
        let outcome = GradingService::grade_main_quiz(&questions, &answers);
        assert_eq!(outcome.answers[1].verdict, Verdict::Indeterminate);
        assert_eq!(outcome.answers[2].verdict, Verdict::Indeterminate);
        assert!(outcome.has_indeterminate);
        // The gradable question still got graded.
        assert_eq!(outcome.answers[0].verdict, Verdict::Correct);
    }

    #[test]
    fn unanswered_question_grades_incorrect() {
        let questions = vec![question(Some("4")), question(Some("Paris"))];
        let answers = vec![answer(questions[0].id, "4")];
        let outcome = GradingService::grade_main_quiz(&questions, &answers);
        assert_eq!(outcome.answers[1].verdict, Verdict::Incorrect);
        assert_eq!(outcome.score, 50);
    }

    #[test]
    fn unknown_question_ids_are_reported_not_dropped() {
        let questions = vec![question(Some("4"))];
        let stray = Uuid::new_v4();
        let answers = vec![answer(questions[0].id, "4"), answer(stray, "noise")];
        let outcome = GradingService::grade_main_quiz(&questions, &answers);
        assert_eq!(outcome.unmatched_question_ids, vec![stray]);
        assert_eq!(outcome.correct_count, 1);
    }

    #[test]
    fn empty_quiz_scores_zero_without_dividing() {
        let outcome = GradingService::grade_main_quiz(&[], &[]);
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.total_questions, 0);
    }

    #[test]
    fn recap_requires_perfection() {
        let assistance_id = Uuid::new_v4();
        let questions: Vec<RecapQuestion> = (0..2)
            .map(|i| RecapQuestion {
                id: Uuid::new_v4(),
                assistance_id,
                text: format!("q{}", i),
                options: sqlx::types::Json(vec!["a".into(), "b".into()]),
                correct_option: 1,
                ordinal: i,
            })
            .collect();

        let one_wrong = vec![
            RecapAnswerInput {
                question_id: questions[0].id,
                selected_option: 1,
            },
            RecapAnswerInput {
                question_id: questions[1].id,
                selected_option: 0,
            },
        ];
        assert!(!GradingService::grade_recap(&questions, &one_wrong).passed);

        let all_right: Vec<RecapAnswerInput> = questions
            .iter()
            .map(|q| RecapAnswerInput {
                question_id: q.id,
                selected_option: 1,
            })
            .collect();
        assert!(GradingService::grade_recap(&questions, &all_right).passed);
    }

    #[test]
    fn reconcile_passes_on_either_path() {
        let verdicts_80 = vec![
            Verdict::Correct,
            Verdict::Correct,
            Verdict::Correct,
            Verdict::Correct,
            Verdict::Incorrect,
        ];
        let verdicts_50 = vec![Verdict::Correct, Verdict::Incorrect];

        let r = GradingService::reconcile(&[50, 50], &verdicts_80);
        assert!(r.passed, "auto 80 passes despite teacher 50");
        assert_eq!(r.auto_correct_percentage, 80);

        let r = GradingService::reconcile(&[80, 80], &verdicts_50);
        assert!(r.passed, "teacher 80 passes despite auto 50");
        assert_eq!(r.teacher_percentage, 80);

        let r = GradingService::reconcile(&[50, 50], &verdicts_50);
        assert!(!r.passed);
    }

    #[test]
    fn reconcile_counts_indeterminate_in_denominator_only() {
        let verdicts = vec![Verdict::Correct, Verdict::Indeterminate];
        let r = GradingService::reconcile(&[100, 0], &verdicts);
        assert_eq!(r.auto_correct_percentage, 50);
    }
}
