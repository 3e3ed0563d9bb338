//! HTTP router wiring all endpoints to the shared [`ApiContext`].

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;

pub fn build_router(ctx: ApiContext) -> Router {
    Router::new()
        .route("/health", get(endpoints::health::health))
        .route(
            "/bulk/upload-lab-results",
            post(endpoints::upload::upload_lab_results),
        )
        .route("/recommendations", get(endpoints::recommendations::list))
        .route(
            "/recommendations/:id",
            get(endpoints::recommendations::detail),
        )
        .route(
            "/recommendations/:id/send",
            post(endpoints::recommendations::send),
        )
        .route(
            "/recommendations/:id/approve",
            post(endpoints::recommendations::approve),
        )
        .route("/panels", get(endpoints::panels::list))
        .route("/panels/:id/items", get(endpoints::panels::items))
        .route("/recent-tests", get(endpoints::recent_tests::recent))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::catalog::PanelCatalog;
    use crate::db::sqlite::open_database;
    use crate::pipeline::classifier_gate::ClassifierGate;
    use crate::pipeline::classify::{ClassificationInvoker, ClassifierResponse, MockClassifier};
    use crate::pipeline::processor::UploadProcessor;
    use crate::pipeline::recommend::{MockTextGenerator, RecommendationGenerator};

    const BOUNDARY: &str = "labflow-test-boundary";

    fn test_context() -> (tempfile::TempDir, ApiContext) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("labflow.db");
        let conn = open_database(&db_path).unwrap();
        conn.execute_batch(
            "INSERT INTO patients (id, hn_number, name) VALUES (1, '000000123', 'Ann Chai');
             INSERT INTO patient_demographics (hn_number, gender) VALUES ('000000123', 'female');
             INSERT INTO doctors (id, name) VALUES (7, 'Dr. Prasert');",
        )
        .unwrap();
        let catalog = Arc::new(PanelCatalog::load(&conn).unwrap());

        let processor = UploadProcessor::new(
            ClassificationInvoker::new(
                Box::new(MockClassifier::with_response(ClassifierResponse::new())),
                Arc::new(ClassifierGate::new()),
            ),
            RecommendationGenerator::new(Box::new(MockTextGenerator::new("Looks fine."))),
        );

        let ctx = ApiContext {
            db_path,
            catalog,
            processor: Arc::new(processor),
        };
        (dir, ctx)
    }

    fn multipart_body(csv: &str) -> String {
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"lab.csv\"\r\n\
             Content-Type: text/csv\r\n\r\n\
             {csv}\r\n\
             --{BOUNDARY}--\r\n"
        )
    }

    fn upload_request(csv: &str, uploader: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/bulk/upload-lab-results")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(uploader) = uploader {
            builder = builder.header("x-uploader-id", uploader);
        }
        builder.body(Body::from(multipart_body(csv))).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    const VALID_CSV: &str = "hn_number,panel_id,test_date,doctor_id,Systolic,Diastolic\n\
                             000000123,1,2024-01-01,7,120,80\n";

    #[tokio::test]
    async fn upload_happy_path_returns_summary() {
        let (_dir, ctx) = test_context();
        let router = build_router(ctx);

        let response = router
            .oneshot(upload_request(VALID_CSV, Some("99")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["summary"]["batches_processed"], 1);
        assert_eq!(json["summary"]["test_instances_created"], 1);
        assert_eq!(json["summary"]["recommendations_created"], 1);
    }

    #[tokio::test]
    async fn upload_without_uploader_header_is_rejected() {
        let (_dir, ctx) = test_context();
        let router = build_router(ctx);

        let response = router
            .oneshot(upload_request(VALID_CSV, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("x-uploader-id"));
    }

    #[tokio::test]
    async fn upload_without_file_field_is_rejected() {
        let (_dir, ctx) = test_context();
        let router = build_router(ctx);

        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"note\"\r\n\r\n\
             hello\r\n\
             --{BOUNDARY}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/bulk/upload-lab-results")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header("x-uploader-id", "99")
            .body(Body::from(body))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"]["message"], "CSV file is required.");
    }

    #[tokio::test]
    async fn upload_with_zero_data_rows_is_rejected() {
        let (_dir, ctx) = test_context();
        let router = build_router(ctx);

        let response = router
            .oneshot(upload_request(
                "hn_number,panel_id,test_date,doctor_id\n",
                Some("99"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"]["message"], "No data found in CSV");
    }

    #[tokio::test]
    async fn upload_with_all_rows_invalid_itemizes_reasons() {
        let (_dir, ctx) = test_context();
        let router = build_router(ctx);

        let csv = "hn_number,panel_id,test_date,doctor_id,Systolic\n\
                   000000123,1,bad-date,7,120\n\
                   ,1,2024-01-01,7,120\n";
        let response = router
            .oneshot(upload_request(csv, Some("99")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "VALIDATION_FAILED");
        assert_eq!(json["error"]["errors"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn partial_success_is_still_200() {
        let (_dir, ctx) = test_context();
        let router = build_router(ctx);

        let csv = "hn_number,panel_id,test_date,doctor_id,Systolic,Diastolic\n\
                   999999999,1,2024-01-01,7,120,80\n\
                   000000123,1,2024-01-01,7,120,80\n";
        let response = router
            .oneshot(upload_request(csv, Some("99")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["summary"]["batches_processed"], 1);
        assert_eq!(json["summary"]["batches_skipped"], 1);
        assert!(!json["warnings"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (_dir, ctx) = test_context();
        let router = build_router(ctx);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn panel_catalog_endpoints() {
        let (_dir, ctx) = test_context();
        let router = build_router(ctx);

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/panels")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["panels"].as_array().unwrap().len(), 6);

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/panels/1/items")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["panel"]["name"], "Blood Pressure");
        assert_eq!(json["items"].as_array().unwrap().len(), 2);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/panels/42/items")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn recommendation_review_flow() {
        let (_dir, ctx) = test_context();
        let router = build_router(ctx);

        // Ingest first so a recommendation exists
        let response = router
            .clone()
            .oneshot(upload_request(VALID_CSV, Some("99")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/recommendations")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let entries = json["data"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        let id = entries[0]["recommendation_id"].as_i64().unwrap();
        assert_eq!(entries[0]["status"], "pending");

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/recommendations/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["patient_name"], "Ann Chai");
        assert_eq!(json["generated_text"], "Looks fine.");
        assert_eq!(json["results"].as_array().unwrap().len(), 2);

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/recommendations/{id}/send"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "sent");

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/recommendations/{id}/approve"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/recommendations/9999/send")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn recent_tests_for_doctor() {
        let (_dir, ctx) = test_context();
        let router = build_router(ctx);

        router
            .clone()
            .oneshot(upload_request(VALID_CSV, Some("99")))
            .await
            .unwrap();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/recent-tests?doctor_id=7&limit=5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let tests = json["tests"].as_array().unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0]["panel_name"], "Blood Pressure");
        assert_eq!(tests[0]["hn_number"], "000000123");
    }
}
