//! Chat room integration tests.

mod common;

use axum::http::StatusCode;
use common::{TestHarness, API_KEY};
use serde_json::{json, Value};

struct Room {
    id: String,
    teacher: String,
    student: String,
}

async fn open_room(harness: &TestHarness) -> Room {
    let teacher = harness.create_user("teacher").await;
    let student = harness.create_user("student").await;
    let lesson = harness.create_lesson(&teacher, 2, 1).await;
    harness.add_credits(&student, 3).await;

    let receipt: Value = harness.book(&lesson, &student, "active").await.json();
    Room {
        id: receipt["chat"]["room_id"].as_str().unwrap().to_string(),
        teacher,
        student,
    }
}

async fn post(
    harness: &TestHarness,
    room_id: &str,
    sender: &str,
    body: &str,
) -> axum_test::TestResponse {
    harness
        .server
        .post(&format!("/v1/chat/rooms/{room_id}/messages"))
        .add_header("x-api-key", API_KEY)
        .json(&json!({ "sender_id": sender, "body": body }))
        .await
}

#[tokio::test]
async fn room_is_shared_across_lessons() {
    let harness = TestHarness::new();
    let room = open_room(&harness).await;

    let second_lesson = harness.create_lesson(&room.teacher, 2, 1).await;
    let receipt: Value = harness
        .book(&second_lesson, &room.student, "active")
        .await
        .json();

    assert_eq!(receipt["chat"]["outcome"], "existing");
    assert_eq!(receipt["chat"]["room_id"], room.id.as_str());

    let fetched: Value = harness
        .server
        .get(&format!("/v1/chat/rooms/{}", room.id))
        .await
        .json();
    assert_eq!(fetched["teacher_id"], room.teacher.as_str());
    assert_eq!(fetched["student_id"], room.student.as_str());
}

#[tokio::test]
async fn participants_post_and_list_messages() {
    let harness = TestHarness::new();
    let room = open_room(&harness).await;

    let message = post(&harness, &room.id, &room.student, "  When do we start?  ").await;
    message.assert_status_ok();
    let message: Value = message.json();
    assert_eq!(message["body"], "When do we start?");
    assert_eq!(message["moderation"], "pending");

    post(&harness, &room.id, &room.teacher, "At nine.")
        .await
        .assert_status_ok();

    let listed: Value = harness
        .server
        .get(&format!("/v1/chat/rooms/{}/messages", room.id))
        .await
        .json();
    let bodies: Vec<&str> = listed["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["body"].as_str().unwrap())
        .collect();
    assert_eq!(bodies.len(), 2);
    assert!(bodies.contains(&"When do we start?"));
    assert!(bodies.contains(&"At nine."));
}

#[tokio::test]
async fn outsider_cannot_post() {
    let harness = TestHarness::new();
    let room = open_room(&harness).await;
    let outsider = harness.create_user("student").await;

    let response = post(&harness, &room.id, &outsider, "hello").await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["error"]["code"], "forbidden");
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let harness = TestHarness::new();
    let room = open_room(&harness).await;

    post(&harness, &room.id, &room.student, "   ")
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn moderation_updates_message() {
    let harness = TestHarness::new();
    let room = open_room(&harness).await;
    let message: Value = post(&harness, &room.id, &room.student, "hi")
        .await
        .json();

    let response = harness
        .server
        .post(&format!(
            "/v1/chat/rooms/{}/messages/{}/moderation",
            room.id,
            message["id"].as_str().unwrap()
        ))
        .add_header("x-api-key", API_KEY)
        .json(&json!({ "status": "rejected" }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["moderation"], "rejected");
}

#[tokio::test]
async fn deleted_participant_closes_the_room() {
    let harness = TestHarness::new();
    let room = open_room(&harness).await;

    harness
        .server
        .delete(&format!("/v1/users/{}", room.student))
        .add_header("x-api-key", API_KEY)
        .await
        .assert_status_ok();

    let response = post(&harness, &room.id, &room.teacher, "still there?").await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.json::<Value>()["error"]["code"],
        "orphan_reference"
    );
}

#[tokio::test]
async fn unknown_pair_is_not_found() {
    let harness = TestHarness::new();
    let teacher = harness.create_user("teacher").await;
    let student = harness.create_user("student").await;

    harness
        .server
        .get(&format!(
            "/v1/chat/rooms?teacher_id={teacher}&student_id={student}"
        ))
        .await
        .assert_status_not_found();
}
