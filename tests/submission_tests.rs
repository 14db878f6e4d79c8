// tests/submission_tests.rs
//
// End-to-end runs of the quiz attempt lifecycle. Skipped when DATABASE_URL is unset.

mod common;

use serde_json::{Value, json};

use common::{get_json, post_json, register_and_login, spawn_app};

/// A course with one quiz of two single-choice questions (first choice correct)
/// and one free-text question, plus an enrolled student.
struct Fixture {
    address: String,
    client: reqwest::Client,
    instructor: String,
    student: String,
    quiz_id: i64,
    /// (question_id, correct_choice_id, wrong_choice_id)
    single: Vec<(i64, i64, i64)>,
    free_text_id: i64,
}

impl Fixture {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn start(&self, token: &str) -> reqwest::Response {
        post_json(
            &self.client,
            self.url(&format!("/api/quizzes/{}/start", self.quiz_id)),
            token,
            json!({}),
        )
        .await
    }

    async fn answer(&self, token: &str, submission_id: i64, body: Value) -> reqwest::Response {
        post_json(
            &self.client,
            self.url(&format!("/api/submissions/{}/answers", submission_id)),
            token,
            body,
        )
        .await
    }

    async fn finalize(&self, token: &str, submission_id: i64) -> reqwest::Response {
        post_json(
            &self.client,
            self.url(&format!("/api/submissions/{}/finalize", submission_id)),
            token,
            json!({}),
        )
        .await
    }
}

async fn create_quiz(client: &reqwest::Client, address: &str, instructor: &str, course_id: i64) -> i64 {
    let response = post_json(
        client,
        format!("{}/api/quizzes", address),
        instructor,
        json!({ "course_id": course_id, "title": "Checkpoint" }),
    )
    .await;
    assert_eq!(response.status().as_u16(), 201);
    response.json::<Value>().await.unwrap()["id"].as_i64().unwrap()
}

async fn create_single_choice(
    client: &reqwest::Client,
    address: &str,
    instructor: &str,
    quiz_id: i64,
    text: &str,
) -> (i64, i64, i64) {
    let response = post_json(
        client,
        format!("{}/api/quizzes/{}/questions", address, quiz_id),
        instructor,
        json!({
            "text": text,
            "question_type": "single_choice",
            "choices": [
                { "text": "right", "is_correct": true },
                { "text": "wrong" }
            ]
        }),
    )
    .await;
    assert_eq!(response.status().as_u16(), 201);
    let question: Value = response.json().await.unwrap();
    let choices = question["choices"].as_array().unwrap();
    (
        question["id"].as_i64().unwrap(),
        choices[0]["id"].as_i64().unwrap(),
        choices[1]["id"].as_i64().unwrap(),
    )
}

async fn setup() -> Option<Fixture> {
    let address = spawn_app().await?;
    let client = reqwest::Client::new();
    let (_, instructor) = register_and_login(&client, &address, "instructor").await;
    let (_, student) = register_and_login(&client, &address, "student").await;

    let response = post_json(
        &client,
        format!("{}/api/courses", address),
        &instructor,
        json!({
            "title": "Compilers",
            "description": "Parsing and codegen",
            "price_cents": 0,
            "status": "active"
        }),
    )
    .await;
    assert_eq!(response.status().as_u16(), 201);
    let course_id = response.json::<Value>().await.unwrap()["id"].as_i64().unwrap();

    let quiz_id = create_quiz(&client, &address, &instructor, course_id).await;
    let mut single = Vec::new();
    for text in ["First?", "Second?"] {
        single.push(create_single_choice(&client, &address, &instructor, quiz_id, text).await);
    }

    let response = post_json(
        &client,
        format!("{}/api/quizzes/{}/questions", address, quiz_id),
        &instructor,
        json!({ "text": "Explain lifetimes.", "question_type": "free_text" }),
    )
    .await;
    assert_eq!(response.status().as_u16(), 201);
    let free_text_id = response.json::<Value>().await.unwrap()["id"].as_i64().unwrap();

    let response = post_json(
        &client,
        format!("{}/api/enrollments", address),
        &student,
        json!({ "course_id": course_id }),
    )
    .await;
    assert_eq!(response.status().as_u16(), 201);

    Some(Fixture {
        address,
        client,
        instructor,
        student,
        quiz_id,
        single,
        free_text_id,
    })
}

async fn id_of(response: reqwest::Response) -> i64 {
    response.json::<Value>().await.unwrap()["id"].as_i64().unwrap()
}

#[tokio::test]
async fn start_resumes_the_attempt_in_progress() {
    let Some(f) = setup().await else { return };

    let first = f.start(&f.student).await;
    assert_eq!(first.status().as_u16(), 201);
    let first: Value = first.json().await.unwrap();
    assert_eq!(first["status"], "in_progress");
    assert!(first["finished_at"].is_null());

    let again = f.start(&f.student).await;
    assert_eq!(again.status().as_u16(), 200);
    let again: Value = again.json().await.unwrap();
    assert_eq!(again["id"], first["id"]);
    assert_eq!(again["started_at"], first["started_at"]);
}

#[tokio::test]
async fn one_right_one_wrong_scores_half() {
    let Some(f) = setup().await else { return };
    let submission_id = id_of(f.start(&f.student).await).await;

    let (q1, q1_right, _) = f.single[0];
    let (q2, _, q2_wrong) = f.single[1];

    let response = f
        .answer(&f.student, submission_id, json!({ "question_id": q1, "selected_choice_id": q1_right }))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let answer: Value = response.json().await.unwrap();
    assert_eq!(answer["question_id"].as_i64(), Some(q1));
    assert!(answer["is_correct"].is_null());

    let response = f
        .answer(&f.student, submission_id, json!({ "question_id": q2, "selected_choice_id": q2_wrong }))
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let response = f
        .answer(&f.student, submission_id, json!({ "question_id": f.free_text_id, "text_answer": "They bound borrows." }))
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let response = f.finalize(&f.student, submission_id).await;
    assert_eq!(response.status().as_u16(), 200);
    let result: Value = response.json().await.unwrap();

    assert_eq!(result["status"], "finished");
    assert!(!result["finished_at"].is_null());
    assert_eq!(result["score"].as_f64(), Some(0.5));
    assert_eq!(result["correct_count"].as_i64(), Some(1));
    assert_eq!(result["gradable_count"].as_i64(), Some(2));

    let results = result["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["outcome"], "correct");
    assert_eq!(results[1]["outcome"], "incorrect");
    assert_eq!(results[2]["outcome"], "ungraded");
    assert!(results[2]["correct"].is_null());
}

#[tokio::test]
async fn finished_submission_is_immutable() {
    let Some(f) = setup().await else { return };
    let submission_id = id_of(f.start(&f.student).await).await;
    let (q1, q1_right, q1_wrong) = f.single[0];

    f.answer(&f.student, submission_id, json!({ "question_id": q1, "selected_choice_id": q1_right }))
        .await;
    let response = f.finalize(&f.student, submission_id).await;
    assert_eq!(response.status().as_u16(), 200);

    // Second finalize is rejected and the recorded score stays.
    let response = f.finalize(&f.student, submission_id).await;
    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_state");

    let response = f
        .answer(&f.student, submission_id, json!({ "question_id": q1, "selected_choice_id": q1_wrong }))
        .await;
    assert_eq!(response.status().as_u16(), 409);

    let response = get_json(
        &f.client,
        f.url(&format!("/api/submissions/{}", submission_id)),
        &f.student,
    )
    .await;
    assert_eq!(response.status().as_u16(), 200);
    let detail: Value = response.json().await.unwrap();
    assert_eq!(detail["score"].as_f64(), Some(0.5));
    assert_eq!(detail["answers"].as_array().unwrap().len(), 1);
    assert_eq!(detail["results"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn last_answer_wins_and_unanswered_scores_zero() {
    let Some(f) = setup().await else { return };
    let submission_id = id_of(f.start(&f.student).await).await;
    let (q1, q1_right, q1_wrong) = f.single[0];

    f.answer(&f.student, submission_id, json!({ "question_id": q1, "selected_choice_id": q1_wrong }))
        .await;
    f.answer(&f.student, submission_id, json!({ "question_id": q1, "selected_choice_id": q1_right }))
        .await;

    let result: Value = f.finalize(&f.student, submission_id).await.json().await.unwrap();
    assert_eq!(result["score"].as_f64(), Some(0.5));

    let results = result["results"].as_array().unwrap();
    assert_eq!(results[0]["outcome"], "correct");
    assert_eq!(results[1]["outcome"], "unanswered");
    assert_eq!(results[1]["points"].as_f64(), Some(0.0));
}

#[tokio::test]
async fn new_attempt_after_finalize() {
    let Some(f) = setup().await else { return };
    let first = id_of(f.start(&f.student).await).await;
    assert_eq!(f.finalize(&f.student, first).await.status().as_u16(), 200);

    let response = f.start(&f.student).await;
    assert_eq!(response.status().as_u16(), 201);
    assert_ne!(id_of(response).await, first);
}

#[tokio::test]
async fn question_from_another_quiz_is_a_mismatch() {
    let Some(f) = setup().await else { return };
    let submission_id = id_of(f.start(&f.student).await).await;

    let course: Value = get_json(
        &f.client,
        f.url(&format!("/api/quizzes/{}", f.quiz_id)),
        &f.instructor,
    )
    .await
    .json()
    .await
    .unwrap();
    let other_quiz = create_quiz(&f.client, &f.address, &f.instructor, course["course_id"].as_i64().unwrap()).await;
    let (foreign_q, foreign_choice, _) =
        create_single_choice(&f.client, &f.address, &f.instructor, other_quiz, "Elsewhere?").await;

    let response = f
        .answer(&f.student, submission_id, json!({ "question_id": foreign_q, "selected_choice_id": foreign_choice }))
        .await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "question_mismatch");
}

#[tokio::test]
async fn payload_must_fit_the_question_type() {
    let Some(f) = setup().await else { return };
    let submission_id = id_of(f.start(&f.student).await).await;
    let (q1, _, _) = f.single[0];
    let (_, q2_right, _) = f.single[1];

    let cases = [
        json!({ "question_id": q1, "text_answer": "right" }),
        json!({ "question_id": q1, "selected_choice_id": q2_right }),
        json!({ "question_id": f.free_text_id, "selected_choice_id": q2_right }),
        json!({ "question_id": q1 }),
    ];
    for body in cases {
        let response = f.answer(&f.student, submission_id, body).await;
        assert_eq!(response.status().as_u16(), 422);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "invalid_answer_format");
    }
}

#[tokio::test]
async fn only_the_owner_may_answer_or_finalize() {
    let Some(f) = setup().await else { return };
    let submission_id = id_of(f.start(&f.student).await).await;
    let (_, intruder) = register_and_login(&f.client, &f.address, "student").await;
    let (q1, q1_right, _) = f.single[0];

    let response = f
        .answer(&intruder, submission_id, json!({ "question_id": q1, "selected_choice_id": q1_right }))
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let response = f.finalize(&intruder, submission_id).await;
    assert_eq!(response.status().as_u16(), 403);

    let response = get_json(
        &f.client,
        f.url(&format!("/api/submissions/{}", submission_id)),
        &intruder,
    )
    .await;
    assert_eq!(response.status().as_u16(), 403);

    // The course instructor can read it.
    let response = get_json(
        &f.client,
        f.url(&format!("/api/submissions/{}", submission_id)),
        &f.instructor,
    )
    .await;
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn start_requires_an_active_enrollment() {
    let Some(f) = setup().await else { return };
    let (_, outsider) = register_and_login(&f.client, &f.address, "student").await;

    let response = f.start(&outsider).await;
    assert_eq!(response.status().as_u16(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "not_enrolled");

    let response = post_json(
        &f.client,
        f.url("/api/quizzes/999999999/start"),
        &f.student,
        json!({}),
    )
    .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn students_do_not_see_the_answer_key() {
    let Some(f) = setup().await else { return };

    let quiz: Value = get_json(&f.client, f.url(&format!("/api/quizzes/{}", f.quiz_id)), &f.student)
        .await
        .json()
        .await
        .unwrap();
    let questions = quiz["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 3);
    assert!(questions[0]["choices"][0].get("is_correct").is_none());

    let quiz: Value = get_json(&f.client, f.url(&format!("/api/quizzes/{}", f.quiz_id)), &f.instructor)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(quiz["questions"][0]["choices"][0]["is_correct"], true);
}

#[tokio::test]
async fn students_list_only_their_own_submissions() {
    let Some(f) = setup().await else { return };
    let submission_id = id_of(f.start(&f.student).await).await;

    let listed: Vec<Value> = get_json(&f.client, f.url("/api/submissions"), &f.student)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"].as_i64(), Some(submission_id));

    let (_, other) = register_and_login(&f.client, &f.address, "student").await;
    let listed: Vec<Value> = get_json(&f.client, f.url("/api/submissions"), &other)
        .await
        .json()
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn quiz_structure_is_frozen_after_a_finished_attempt() {
    let Some(f) = setup().await else { return };
    let submission_id = id_of(f.start(&f.student).await).await;
    let (q1, q1_right, _) = f.single[0];
    let (q2, _, q2_wrong) = f.single[1];

    f.answer(&f.student, submission_id, json!({ "question_id": q1, "selected_choice_id": q1_right }))
        .await;
    f.answer(&f.student, submission_id, json!({ "question_id": q2, "selected_choice_id": q2_wrong }))
        .await;
    assert_eq!(f.finalize(&f.student, submission_id).await.status().as_u16(), 200);

    let delete = |path: String| {
        f.client
            .delete(f.url(&path))
            .bearer_auth(&f.instructor)
            .send()
    };

    for path in [
        format!("/api/questions/{}", q1),
        format!("/api/choices/{}", q2_wrong),
        format!("/api/quizzes/{}", f.quiz_id),
    ] {
        let response = delete(path).await.unwrap();
        assert_eq!(response.status().as_u16(), 409);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "conflict");
    }

    let response = post_json(
        &f.client,
        f.url(&format!("/api/quizzes/{}/questions", f.quiz_id)),
        &f.instructor,
        json!({ "text": "Late addition?", "question_type": "free_text" }),
    )
    .await;
    assert_eq!(response.status().as_u16(), 409);

    let detail: Value = get_json(
        &f.client,
        f.url(&format!("/api/submissions/{}", submission_id)),
        &f.student,
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(detail["score"].as_f64(), Some(0.5));
    assert_eq!(detail["answers"].as_array().unwrap().len(), 2);
    let outcomes: Vec<&str> = detail["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["outcome"].as_str().unwrap())
        .collect();
    assert_eq!(outcomes, vec!["correct", "incorrect", "unanswered"]);
}

#[tokio::test]
async fn concurrent_starts_share_one_attempt() {
    let Some(f) = setup().await else { return };

    let (a, b, c, d) = tokio::join!(
        f.start(&f.student),
        f.start(&f.student),
        f.start(&f.student),
        f.start(&f.student)
    );

    let mut created = 0;
    let mut ids = Vec::new();
    for response in [a, b, c, d] {
        match response.status().as_u16() {
            201 => created += 1,
            200 => {}
            other => panic!("unexpected status {}", other),
        }
        ids.push(id_of(response).await);
    }

    assert_eq!(created, 1);
    assert!(ids.iter().all(|id| *id == ids[0]));

    let listed: Vec<Value> = get_json(
        &f.client,
        f.url(&format!("/api/submissions?quiz_id={}&status=in_progress", f.quiz_id)),
        &f.student,
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn answer_racing_finalize_is_graded_or_rejected() {
    let Some(f) = setup().await else { return };
    let submission_id = id_of(f.start(&f.student).await).await;
    let (q1, q1_right, _) = f.single[0];

    let (answered, finalized) = tokio::join!(
        f.answer(&f.student, submission_id, json!({ "question_id": q1, "selected_choice_id": q1_right })),
        f.finalize(&f.student, submission_id)
    );
    assert_eq!(finalized.status().as_u16(), 200);

    let detail: Value = get_json(
        &f.client,
        f.url(&format!("/api/submissions/{}", submission_id)),
        &f.student,
    )
    .await
    .json()
    .await
    .unwrap();
    let answers = detail["answers"].as_array().unwrap();

    match answered.status().as_u16() {
        // Committed before finalize: graded exactly once.
        200 => {
            assert_eq!(answers.len(), 1);
            assert_eq!(answers[0]["is_correct"], true);
            assert_eq!(detail["score"].as_f64(), Some(0.5));
        }
        // Arrived after finalize: rejected without touching the result.
        409 => {
            let body: Value = answered.json().await.unwrap();
            assert_eq!(body["code"], "invalid_state");
            assert!(answers.is_empty());
            assert_eq!(detail["score"].as_f64(), Some(0.0));
        }
        other => panic!("unexpected status {}", other),
    }
}

#[tokio::test]
async fn free_text_answers_are_sanitized() {
    let Some(f) = setup().await else { return };
    let submission_id = id_of(f.start(&f.student).await).await;

    let response = f
        .answer(
            &f.student,
            submission_id,
            json!({ "question_id": f.free_text_id, "text_answer": "<b>Borrows</b><script>alert(1)</script>" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let answer: Value = response.json().await.unwrap();
    let stored = answer["text_answer"].as_str().unwrap();
    assert!(stored.contains("<b>Borrows</b>"));
    assert!(!stored.contains("script"));
}
