/*!
 * HTTP front for the assistant action protocol.
 *
 * A single `POST /` endpoint. Other paths answer 404 and other methods on
 * `/` answer 405. Requests from any origin are allowed.
 */
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::model::ActionRequest;
use crate::smarthome::SmartHome;

/// Router serving the action endpoint
pub fn action_router(smarthome: Arc<SmartHome>) -> Router {
    Router::new()
        .route("/", post(handle_action))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(smarthome)
}

/// Serve the action endpoint on `listener` until the task is dropped
pub async fn serve_actions(listener: TcpListener, smarthome: Arc<SmartHome>) -> std::io::Result<()> {
    info!("Action endpoint listening on {}", listener.local_addr()?);
    axum::serve(listener, action_router(smarthome)).await
}

// The body is parsed by hand so clients that omit the content type are
// still served.
async fn handle_action(State(smarthome): State<Arc<SmartHome>>, body: Bytes) -> Response {
    let request: ActionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejecting malformed action request: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    Json(smarthome.handle(request).await).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use hausflow_core::types::{DeviceDescriptor, DeviceKind, MacAddress};
    use hausflow_devices::{AdapterContext, ConnectionSet, DeviceRegistry};

    const GARAGE: MacAddress = MacAddress::new([0x00, 0x0d, 0x6f, 0x00, 0x00, 0x01]);

    fn router() -> Router {
        let ctx = AdapterContext::new(Arc::new(ConnectionSet::new()), reqwest::Client::new());
        let registry = DeviceRegistry::new(
            vec![DeviceDescriptor::new(GARAGE, DeviceKind::Garage, "Garage")],
            &ctx,
        );
        action_router(Arc::new(SmartHome::new(Arc::new(registry), "tester")))
    }

    fn request(method: Method, uri: &str, body: Body) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(body).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_query_without_content_type() {
        let body = json!({
            "requestId": "r1",
            "inputs": [{"intent": "action.devices.QUERY", "payload": {"devices": [{"id": GARAGE.to_string()}]}}],
        });
        let response = router()
            .oneshot(request(Method::POST, "/", Body::from(body.to_string())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let value = json_body(response).await;
        assert_eq!(value["requestId"], json!("r1"));
        assert_eq!(
            value["payload"]["devices"][GARAGE.to_string()],
            json!({"status": "OFFLINE", "online": false})
        );
    }

    #[tokio::test]
    async fn test_routing_errors() {
        let response = router()
            .oneshot(request(Method::POST, "/fulfillment", Body::from("{}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router()
            .oneshot(request(Method::GET, "/", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let response = router()
            .oneshot(request(Method::POST, "/", Body::from("not json")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/")
                    .header("Origin", "http://demo.local")
                    .body(Body::from(r#"{"requestId":"r2","inputs":[{"intent":"SYNC"}]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
    }
}
