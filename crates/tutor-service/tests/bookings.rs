//! Booking lifecycle integration tests.

mod common;

use axum::http::StatusCode;
use common::{TestHarness, API_KEY};
use serde_json::{json, Value};

async fn transition(
    harness: &TestHarness,
    booking: &Value,
    status: &str,
) -> axum_test::TestResponse {
    harness
        .server
        .post(&format!("/v1/bookings/{}/transition", booking["id"].as_str().unwrap()))
        .add_header("x-api-key", API_KEY)
        .json(&json!({
            "lesson_id": booking["lesson_id"],
            "student_id": booking["student_id"],
            "status": status,
        }))
        .await
}

// ============================================================================
// Activation
// ============================================================================

#[tokio::test]
async fn active_booking_charges_and_opens_chat() {
    let harness = TestHarness::new();
    let teacher = harness.create_user("teacher").await;
    let student = harness.create_user("student").await;
    let lesson = harness.create_lesson(&teacher, 3, 4).await;
    harness.add_credits(&student, 10).await;

    let response = harness.book(&lesson, &student, "active").await;
    response.assert_status_ok();

    let receipt: Value = response.json();
    assert_eq!(receipt["changed"], true);
    assert_eq!(receipt["booking"]["status"], "active");
    assert_eq!(receipt["booking"]["charged_credits"], 4);
    assert_eq!(receipt["deduction"]["balance"], 6);
    assert_eq!(receipt["chat"]["outcome"], "created");
    assert_eq!(harness.balance(&student).await, 6);

    let seats: Value = harness
        .server
        .get(&format!("/v1/lessons/{lesson}/seats"))
        .await
        .json();
    assert_eq!(seats["active"], 1);
    assert_eq!(seats["available"], 2);

    let room = harness
        .server
        .get(&format!(
            "/v1/chat/rooms?teacher_id={teacher}&student_id={student}"
        ))
        .await;
    room.assert_status_ok();
    assert_eq!(
        room.json::<Value>()["id"],
        receipt["chat"]["room_id"]
    );
}

#[tokio::test]
async fn activation_without_funds_is_payment_required() {
    let harness = TestHarness::new();
    let teacher = harness.create_user("teacher").await;
    let student = harness.create_user("student").await;
    let lesson = harness.create_lesson(&teacher, 3, 2).await;
    harness.add_credits(&student, 1).await;

    let pending: Value = harness.book(&lesson, &student, "pending").await.json();
    let booking = pending["booking"].clone();

    let response = transition(&harness, &booking, "active").await;
    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_balance");
    assert_eq!(body["error"]["details"]["balance"], 1);
    assert_eq!(body["error"]["details"]["required"], 2);

    // Nothing from the failed activation is visible.
    let stored: Value = harness
        .server
        .get(&format!("/v1/bookings/{}", booking["id"].as_str().unwrap()))
        .await
        .json();
    assert_eq!(stored["status"], "pending");
    assert_eq!(harness.balance(&student).await, 1);
    harness
        .server
        .get(&format!(
            "/v1/chat/rooms?teacher_id={teacher}&student_id={student}"
        ))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn full_lesson_rejects_activation() {
    let harness = TestHarness::new();
    let teacher = harness.create_user("teacher").await;
    let first = harness.create_user("student").await;
    let second = harness.create_user("student").await;
    let lesson = harness.create_lesson(&teacher, 1, 1).await;
    harness.add_credits(&first, 5).await;
    harness.add_credits(&second, 5).await;

    harness
        .book(&lesson, &first, "active")
        .await
        .assert_status_ok();

    let response = harness.book(&lesson, &second, "active").await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "capacity_exceeded");
    assert_eq!(harness.balance(&second).await, 5);
}

#[tokio::test]
async fn capacity_cannot_drop_below_active_seats() {
    let harness = TestHarness::new();
    let teacher = harness.create_user("teacher").await;
    let first = harness.create_user("student").await;
    let second = harness.create_user("student").await;
    let lesson = harness.create_lesson(&teacher, 3, 1).await;
    harness.add_credits(&first, 5).await;
    harness.add_credits(&second, 5).await;
    harness.book(&lesson, &first, "active").await.assert_status_ok();
    harness.book(&lesson, &second, "active").await.assert_status_ok();

    let response = harness
        .server
        .put(&format!("/v1/lessons/{lesson}/capacity"))
        .add_header("x-api-key", API_KEY)
        .json(&json!({ "capacity": 1 }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["error"]["details"]["retryable"], false);

    let response = harness
        .server
        .put(&format!("/v1/lessons/{lesson}/capacity"))
        .add_header("x-api-key", API_KEY)
        .json(&json!({ "capacity": 2 }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["capacity"], 2);
}

// ============================================================================
// Cancellation and refunds
// ============================================================================

#[tokio::test]
async fn cancel_refunds_once() {
    let harness = TestHarness::new();
    let teacher = harness.create_user("teacher").await;
    let student = harness.create_user("student").await;
    let lesson = harness.create_lesson(&teacher, 2, 3).await;
    harness.add_credits(&student, 10).await;

    let receipt: Value = harness.book(&lesson, &student, "active").await.json();
    let booking = receipt["booking"].clone();
    assert_eq!(harness.balance(&student).await, 7);

    let response = transition(&harness, &booking, "cancelled").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["booking"]["status"], "cancelled");
    assert_eq!(body["refund"]["outcome"], "refunded");
    assert_eq!(harness.balance(&student).await, 10);

    // Same-state request is a no-op.
    let again: Value = transition(&harness, &booking, "cancelled").await.json();
    assert_eq!(again["changed"], false);
    assert_eq!(harness.balance(&student).await, 10);

    // An explicit refund after the cancellation returns the earlier entry.
    let refund: Value = harness
        .server
        .post(&format!("/v1/bookings/{}/refund", booking["id"].as_str().unwrap()))
        .add_header("x-api-key", API_KEY)
        .json(&json!({ "student_id": student, "amount": 3 }))
        .await
        .json();
    assert_eq!(refund["outcome"], "duplicate_refund");
    assert_eq!(harness.balance(&student).await, 10);

    let seats: Value = harness
        .server
        .get(&format!("/v1/lessons/{lesson}/seats"))
        .await
        .json();
    assert_eq!(seats["active"], 0);
}

#[tokio::test]
async fn refund_without_a_charge_is_rejected() {
    let harness = TestHarness::new();
    let teacher = harness.create_user("teacher").await;
    let student = harness.create_user("student").await;
    let lesson = harness.create_lesson(&teacher, 2, 1).await;
    harness.add_credits(&student, 5).await;

    let receipt: Value = harness.book(&lesson, &student, "pending").await.json();
    let response = harness
        .server
        .post(&format!(
            "/v1/bookings/{}/refund",
            receipt["booking"]["id"].as_str().unwrap()
        ))
        .add_header("x-api-key", API_KEY)
        .json(&json!({ "student_id": student, "amount": 500 }))
        .await;

    response.assert_status_bad_request();
    assert_eq!(harness.balance(&student).await, 5);
}

#[tokio::test]
async fn terminal_booking_cannot_be_reactivated() {
    let harness = TestHarness::new();
    let teacher = harness.create_user("teacher").await;
    let student = harness.create_user("student").await;
    let lesson = harness.create_lesson(&teacher, 2, 1).await;
    harness.add_credits(&student, 5).await;

    let receipt: Value = harness.book(&lesson, &student, "active").await.json();
    let booking = receipt["booking"].clone();
    transition(&harness, &booking, "cancelled")
        .await
        .assert_status_ok();

    let response = transition(&harness, &booking, "active").await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(
        response.json::<Value>()["error"]["code"],
        "invalid_transition"
    );
}

#[tokio::test]
async fn completion_before_lesson_end_is_rejected() {
    let harness = TestHarness::new();
    let teacher = harness.create_user("teacher").await;
    let student = harness.create_user("student").await;
    let lesson = harness.create_lesson(&teacher, 2, 1).await;
    harness.add_credits(&student, 5).await;

    let receipt: Value = harness.book(&lesson, &student, "active").await.json();
    let response = transition(&harness, &receipt["booking"], "completed").await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(
        response.json::<Value>()["error"]["code"],
        "invalid_transition"
    );
}

#[tokio::test]
async fn mismatched_transition_is_bad_request() {
    let harness = TestHarness::new();
    let teacher = harness.create_user("teacher").await;
    let student = harness.create_user("student").await;
    let other = harness.create_user("student").await;
    let lesson = harness.create_lesson(&teacher, 2, 1).await;

    let receipt: Value = harness.book(&lesson, &student, "pending").await.json();
    let mut booking = receipt["booking"].clone();
    booking["student_id"] = json!(other);

    transition(&harness, &booking, "cancelled")
        .await
        .assert_status_bad_request();
}

// ============================================================================
// References
// ============================================================================

#[tokio::test]
async fn booking_a_deleted_lesson_is_orphan_reference() {
    let harness = TestHarness::new();
    let teacher = harness.create_user("teacher").await;
    let student = harness.create_user("student").await;
    let lesson = harness.create_lesson(&teacher, 2, 1).await;

    harness
        .server
        .delete(&format!("/v1/lessons/{lesson}"))
        .add_header("x-api-key", API_KEY)
        .await
        .assert_status_ok();

    let response = harness.book(&lesson, &student, "pending").await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.json::<Value>()["error"]["code"],
        "orphan_reference"
    );
}

#[tokio::test]
async fn deleting_a_student_cascades() {
    let harness = TestHarness::new();
    let teacher = harness.create_user("teacher").await;
    let student = harness.create_user("student").await;
    let lesson = harness.create_lesson(&teacher, 2, 1).await;
    harness.add_credits(&student, 5).await;
    let receipt: Value = harness.book(&lesson, &student, "active").await.json();

    let response = harness
        .server
        .delete(&format!("/v1/users/{student}"))
        .add_header("x-api-key", API_KEY)
        .await;
    response.assert_status_ok();
    let report: Value = response.json();
    assert_eq!(report["users"], 1);
    assert_eq!(report["bookings"], 1);
    assert_eq!(report["seats_released"], 1);
    assert_eq!(report["chat_rooms"], 1);

    let booking: Value = harness
        .server
        .get(&format!(
            "/v1/bookings/{}",
            receipt["booking"]["id"].as_str().unwrap()
        ))
        .await
        .json();
    assert!(!booking["deleted_at"].is_null());

    let seats: Value = harness
        .server
        .get(&format!("/v1/lessons/{lesson}/seats"))
        .await
        .json();
    assert_eq!(seats["active"], 0);
}

#[tokio::test]
async fn mutations_require_api_key() {
    let harness = TestHarness::new();
    let teacher = harness.create_user("teacher").await;
    let student = harness.create_user("student").await;
    let lesson = harness.create_lesson(&teacher, 2, 1).await;

    harness
        .server
        .post("/v1/bookings")
        .json(&json!({ "lesson_id": lesson, "student_id": student }))
        .await
        .assert_status_unauthorized();
}

// ============================================================================
// Import and reconciliation
// ============================================================================

#[tokio::test]
async fn imported_bookings_get_rooms_from_reconciliation() {
    let harness = TestHarness::new();
    let teacher = harness.create_user("teacher").await;
    let lesson = harness.create_lesson(&teacher, 5, 1).await;
    let mut students = Vec::new();
    for _ in 0..3 {
        let student = harness.create_user("student").await;
        harness.add_credits(&student, 5).await;
        students.push(student);
    }

    let bookings: Vec<Value> = students
        .iter()
        .map(|s| json!({ "lesson_id": lesson, "student_id": s, "status": "active" }))
        .collect();
    let response = harness
        .server
        .post("/v1/bookings/import")
        .add_header("x-api-key", API_KEY)
        .json(&json!({ "bookings": bookings }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["bookings"].as_array().unwrap().len(), 3);

    for student in &students {
        assert_eq!(harness.balance(student).await, 4);
        harness
            .server
            .get(&format!(
                "/v1/chat/rooms?teacher_id={teacher}&student_id={student}"
            ))
            .await
            .assert_status_not_found();
    }

    let report: Value = harness
        .server
        .post("/v1/chat/reconcile")
        .add_header("x-api-key", API_KEY)
        .await
        .json();
    assert_eq!(report["scanned"], 3);
    assert_eq!(report["created"], 3);
    assert_eq!(report["skipped"], 0);

    let report: Value = harness
        .server
        .post("/v1/chat/reconcile")
        .add_header("x-api-key", API_KEY)
        .await
        .json();
    assert_eq!(report["created"], 0);
}

#[tokio::test]
async fn failed_import_writes_nothing() {
    let harness = TestHarness::new();
    let teacher = harness.create_user("teacher").await;
    let lesson = harness.create_lesson(&teacher, 1, 1).await;
    let first = harness.create_user("student").await;
    let second = harness.create_user("student").await;
    harness.add_credits(&first, 5).await;
    harness.add_credits(&second, 5).await;

    let response = harness
        .server
        .post("/v1/bookings/import")
        .add_header("x-api-key", API_KEY)
        .json(&json!({ "bookings": [
            { "lesson_id": lesson, "student_id": first, "status": "active" },
            { "lesson_id": lesson, "student_id": second, "status": "active" },
        ]}))
        .await;
    response.assert_status(StatusCode::CONFLICT);

    assert_eq!(harness.balance(&first).await, 5);
    let listed: Value = harness
        .server
        .get(&format!("/v1/lessons/{lesson}/bookings"))
        .await
        .json();
    assert!(listed["bookings"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn empty_import_is_bad_request() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/v1/bookings/import")
        .add_header("x-api-key", API_KEY)
        .json(&json!({ "bookings": [] }))
        .await
        .assert_status_bad_request();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_activations_take_the_last_seat_once() {
    let harness = TestHarness::new();
    let teacher = harness.create_user("teacher").await;
    let lesson = harness.create_lesson(&teacher, 1, 1).await;
    let first = harness.create_user("student").await;
    let second = harness.create_user("student").await;
    harness.add_credits(&first, 5).await;
    harness.add_credits(&second, 5).await;

    let (a, b) = tokio::join!(
        harness.book(&lesson, &first, "active"),
        harness.book(&lesson, &second, "active"),
    );

    let mut statuses = [a.status_code(), b.status_code()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);
    assert_eq!(harness.balance(&first).await + harness.balance(&second).await, 9);

    let seats: Value = harness
        .server
        .get(&format!("/v1/lessons/{lesson}/seats"))
        .await
        .json();
    assert_eq!(seats["active"], 1);
    assert_eq!(seats["available"], 0);
}
