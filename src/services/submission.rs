// src/services/submission.rs

use sqlx::{PgConnection, PgPool};

use crate::{
    config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    error::AppError,
    models::{
        submission::{
            Answer, Submission, SubmissionDetail, SubmissionListParams, SubmissionResult,
            SubmitAnswerRequest,
        },
        user::Role,
    },
    services::{
        catalog,
        grading::{self, ChoiceKey, QuestionKey},
    },
    utils::{html::clean_html, jwt::Claims},
};

const SUBMISSION_COLUMNS: &str =
    "id, quiz_id, student_id, status, started_at, finished_at, score, correct_count, gradable_count";

/// Result of `start`: the attempt plus whether it was created by this call.
#[derive(Debug)]
pub struct StartOutcome {
    pub submission: Submission,
    pub created: bool,
}

/// Submission engine: drives one student's attempt through
/// `in_progress` -> `finished`. Every operation is a single transaction.
pub struct SubmissionService;

impl SubmissionService {
    /// Opens an attempt, or returns the one already in progress for this (student, quiz).
    pub async fn start(
        pool: &PgPool,
        student_id: i64,
        quiz_id: i64,
    ) -> Result<StartOutcome, AppError> {
        let mut tx = pool.begin().await?;

        let quiz = catalog::get_quiz(&mut tx, quiz_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;

        if !catalog::is_actively_enrolled(&mut tx, student_id, quiz.course_id).await? {
            tracing::warn!(student_id, quiz_id, "start rejected: not enrolled");
            return Err(AppError::NotEnrolled(
                "You must be actively enrolled in this course to take the quiz".to_string(),
            ));
        }

        // The partial unique index on (student_id, quiz_id) WHERE status = 'in_progress'
        // turns a concurrent second insert into a no-op; the re-select then sees the winner.
        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;

            let inserted = sqlx::query_as::<_, Submission>(&format!(
                r#"
                INSERT INTO submissions (quiz_id, student_id, status)
                VALUES ($1, $2, 'in_progress')
                ON CONFLICT (student_id, quiz_id) WHERE status = 'in_progress' DO NOTHING
                RETURNING {SUBMISSION_COLUMNS}
                "#
            ))
            .bind(quiz_id)
            .bind(student_id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(submission) = inserted {
                tracing::info!(
                    submission_id = submission.id,
                    student_id,
                    quiz_id,
                    "submission started"
                );
                break StartOutcome {
                    submission,
                    created: true,
                };
            }

            let existing = sqlx::query_as::<_, Submission>(&format!(
                r#"
                SELECT {SUBMISSION_COLUMNS} FROM submissions
                WHERE student_id = $1 AND quiz_id = $2 AND status = 'in_progress'
                "#
            ))
            .bind(student_id)
            .bind(quiz_id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(submission) = existing {
                tracing::info!(
                    submission_id = submission.id,
                    student_id,
                    quiz_id,
                    "submission resumed"
                );
                break StartOutcome {
                    submission,
                    created: false,
                };
            }

            // The conflicting attempt was finalized between the two statements.
            if attempts >= 3 {
                return Err(AppError::Conflict(
                    "Could not start the submission, please retry".to_string(),
                ));
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Records (or replaces) the caller's answer to one question. Last write wins.
    pub async fn submit_answer(
        pool: &PgPool,
        caller_id: i64,
        submission_id: i64,
        request: SubmitAnswerRequest,
    ) -> Result<Answer, AppError> {
        let mut tx = pool.begin().await?;

        let submission = lock_submission(&mut tx, submission_id).await?;
        if let Err(e) = grading::ensure_modifiable(&submission, caller_id) {
            tracing::warn!(submission_id, caller_id, error = ?e, "answer rejected");
            return Err(e);
        }

        let question = sqlx::query_as::<_, QuestionKey>(
            "SELECT id, position, question_type AS kind FROM questions WHERE id = $1 AND quiz_id = $2",
        )
        .bind(request.question_id)
        .bind(submission.quiz_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            AppError::QuestionMismatch(
                "Question does not belong to this submission's quiz".to_string(),
            )
        })?;

        let choices = sqlx::query_as::<_, ChoiceKey>(
            "SELECT id, question_id, is_correct FROM choices WHERE question_id = $1",
        )
        .bind(question.id)
        .fetch_all(&mut *tx)
        .await?;

        let payload = grading::resolve_payload(question.kind.0, &request, &choices)?;

        let answer = sqlx::query_as::<_, Answer>(
            r#"
            INSERT INTO answers (submission_id, question_id, selected_choice_id, text_answer)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (submission_id, question_id) DO UPDATE SET
                selected_choice_id = EXCLUDED.selected_choice_id,
                text_answer = EXCLUDED.text_answer,
                is_correct = NULL,
                points = NULL,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(submission.id)
        .bind(question.id)
        .bind(payload.choice_id())
        .bind(payload.text().map(clean_html))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            submission_id,
            question_id = question.id,
            answer_id = answer.id,
            "answer recorded"
        );
        Ok(answer)
    }

    /// Closes the attempt and grades it. The status change and every answer grade are
    /// written in one transaction; on any failure the submission stays in progress.
    pub async fn finalize(
        pool: &PgPool,
        caller_id: i64,
        submission_id: i64,
    ) -> Result<SubmissionResult, AppError> {
        let mut tx = pool.begin().await?;

        let submission = lock_submission(&mut tx, submission_id).await?;
        if let Err(e) = grading::ensure_modifiable(&submission, caller_id) {
            tracing::warn!(submission_id, caller_id, error = ?e, "finalize rejected");
            return Err(e);
        }

        // Shared lock: question and choice removal waits for this grading to commit.
        sqlx::query("SELECT id FROM quizzes WHERE id = $1 FOR SHARE")
            .bind(submission.quiz_id)
            .execute(&mut *tx)
            .await?;

        let questions = load_question_keys(&mut tx, submission.quiz_id).await?;
        let answers = load_answers(&mut tx, submission.id).await?;
        let keys = sqlx::query_as::<_, ChoiceKey>(
            r#"
            SELECT c.id, c.question_id, c.is_correct
            FROM choices c
            JOIN questions q ON q.id = c.question_id
            WHERE q.quiz_id = $1
            "#,
        )
        .bind(submission.quiz_id)
        .fetch_all(&mut *tx)
        .await?;

        let report = grading::grade(&questions, &answers, &keys);

        for result in &report.results {
            let Some(answer_id) = result.answer_id else {
                continue;
            };
            let points = result.correct.map(|_| result.points);
            sqlx::query(
                "UPDATE answers SET is_correct = $1, points = $2, updated_at = NOW() WHERE id = $3",
            )
            .bind(result.correct)
            .bind(points)
            .bind(answer_id)
            .execute(&mut *tx)
            .await?;
        }

        let finished = sqlx::query_as::<_, Submission>(&format!(
            r#"
            UPDATE submissions
            SET status = 'finished',
                finished_at = NOW(),
                score = $2,
                correct_count = $3,
                gradable_count = $4
            WHERE id = $1 AND status = 'in_progress'
            RETURNING {SUBMISSION_COLUMNS}
            "#
        ))
        .bind(submission.id)
        .bind(report.score)
        .bind(report.correct_count)
        .bind(report.gradable_count)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::InvalidState("Submission is already finished".to_string()))?;

        tx.commit().await?;

        tracing::info!(
            submission_id,
            score = report.score,
            correct = report.correct_count,
            gradable = report.gradable_count,
            "submission finalized"
        );

        Ok(SubmissionResult {
            submission: finished,
            results: report.results,
        })
    }

    /// Submission with answers. Visible to its student, the course instructor and admins.
    pub async fn get_detail(
        pool: &PgPool,
        claims: &Claims,
        submission_id: i64,
    ) -> Result<SubmissionDetail, AppError> {
        let mut conn = pool.acquire().await?;

        let submission = sqlx::query_as::<_, Submission>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = $1"
        ))
        .bind(submission_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

        let caller_id = claims.user_id()?;
        if submission.student_id != caller_id {
            let instructor = catalog::instructor_of_quiz(&mut conn, submission.quiz_id).await?;
            catalog::authorize_author(claims, instructor)?;
        }

        let answers = load_answers(&mut conn, submission.id).await?;
        let results = if submission.finished_at.is_some() {
            let questions = load_question_keys(&mut conn, submission.quiz_id).await?;
            Some(grading::stored_results(&questions, &answers).results)
        } else {
            None
        };

        Ok(SubmissionDetail {
            submission,
            answers,
            results,
        })
    }

    /// Students see their own attempts, instructors the attempts on their courses, admins all.
    pub async fn list(
        pool: &PgPool,
        claims: &Claims,
        params: SubmissionListParams,
    ) -> Result<Vec<Submission>, AppError> {
        let caller_id = claims.user_id()?;
        let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = params.offset.unwrap_or(0).max(0);

        let scope = match claims.role()? {
            Role::Admin => "$1::BIGINT IS NOT NULL",
            Role::Instructor => "c.instructor_id = $1",
            Role::Student => "s.student_id = $1",
        };

        let submissions = sqlx::query_as::<_, Submission>(&format!(
            r#"
            SELECT s.id, s.quiz_id, s.student_id, s.status, s.started_at, s.finished_at,
                   s.score, s.correct_count, s.gradable_count
            FROM submissions s
            JOIN quizzes q ON q.id = s.quiz_id
            JOIN courses c ON c.id = q.course_id
            WHERE {scope}
              AND ($2::BIGINT IS NULL OR s.quiz_id = $2)
              AND ($3::TEXT IS NULL OR s.status = $3)
            ORDER BY s.started_at DESC, s.id DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(caller_id)
        .bind(params.quiz_id)
        .bind(params.status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(submissions)
    }
}

/// Row lock serializing answer capture and finalize on one submission.
async fn lock_submission(
    conn: &mut PgConnection,
    submission_id: i64,
) -> Result<Submission, AppError> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = $1 FOR UPDATE"
    ))
    .bind(submission_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))
}

async fn load_question_keys(
    conn: &mut PgConnection,
    quiz_id: i64,
) -> Result<Vec<QuestionKey>, AppError> {
    let questions = sqlx::query_as::<_, QuestionKey>(
        r#"
        SELECT id, position, question_type AS kind
        FROM questions
        WHERE quiz_id = $1
        ORDER BY position ASC, id ASC
        "#,
    )
    .bind(quiz_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(questions)
}

async fn load_answers(conn: &mut PgConnection, submission_id: i64) -> Result<Vec<Answer>, AppError> {
    let answers = sqlx::query_as::<_, Answer>(
        r#"
        SELECT a.*
        FROM answers a
        JOIN questions q ON q.id = a.question_id
        WHERE a.submission_id = $1
        ORDER BY q.position ASC, q.id ASC
        "#,
    )
    .bind(submission_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(answers)
}
