//! HTTP handler functions for the intersection API.

use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{Either, HttpResponse, web};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use wri_engine::{CancelToken, EngineError};
use wri_intersect_models::{
    ApiError, ApiLayer, ApiLayerField, ApiServiceInfo, ExtractIntersectionsForm,
    ExtractIntersectionsJson, GeometryParams, IntersectionCriteria, to_api_response,
};

use crate::AppState;

/// `GET /`
pub async fn root() -> HttpResponse {
    HttpResponse::Ok().json(ApiServiceInfo {
        description: "Extract intersection information".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /layers`
///
/// Lists the catalog's leaf layers with their mapped fields.
pub async fn layers(state: web::Data<AppState>) -> HttpResponse {
    let layers: Vec<ApiLayer> = state
        .engine
        .catalog()
        .entries()
        .iter()
        .map(|entry| ApiLayer {
            index: entry.index(),
            name: entry.name().to_string(),
            fields: entry
                .field_map()
                .iter()
                .map(|map| ApiLayerField {
                    field: map.field.clone(),
                    index: map.index,
                })
                .collect(),
        })
        .collect();

    HttpResponse::Ok().json(layers)
}

/// `POST /ExtractIntersections`
///
/// Accepts `geometry` (base64 WKB) and `criteria` as a form or a JSON
/// body.
pub async fn extract_intersections(
    state: web::Data<AppState>,
    body: Either<web::Json<ExtractIntersectionsJson>, web::Form<ExtractIntersectionsForm>>,
) -> HttpResponse {
    let (geometry, criteria) = match body {
        Either::Left(json) => {
            let json = json.into_inner();
            (json.geometry, json.criteria.map(parse_criteria_value))
        }
        Either::Right(form) => {
            let form = form.into_inner();
            (
                form.geometry,
                form.criteria
                    .map(|text| IntersectionCriteria::from_json(&text)),
            )
        }
    };

    let bytes = match decode_geometry_param(geometry.as_deref()) {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };

    let criteria = match criteria {
        None => return bad_request("criteria parameter is required."),
        Some(Err(e)) => return bad_request(format!("criteria parameter is invalid: {e}")),
        Some(Ok(criteria)) => criteria,
    };

    let engine = state.engine.clone();
    let cancel = CancelToken::with_timeout(state.request_timeout);
    let worker = cancel.clone();

    let result = run_cancellable(&cancel, move || {
        engine.compute_intersections_wkb(&bytes, &criteria, &worker)
    })
    .await;

    match result {
        Ok(Ok(result)) => HttpResponse::Ok().json(to_api_response(result)),
        Ok(Err(e)) => engine_error(&e),
        Err(e) => {
            log::error!("Intersection task failed: {e}");
            HttpResponse::InternalServerError().json(ApiError::new("Intersection task failed"))
        }
    }
}

/// `POST /AreasAndLengths`
///
/// Measures a single geometry in the measurement system.
pub async fn areas_and_lengths(
    state: web::Data<AppState>,
    body: Either<web::Json<GeometryParams>, web::Form<GeometryParams>>,
) -> HttpResponse {
    let params = match body {
        Either::Left(json) => json.into_inner(),
        Either::Right(form) => form.into_inner(),
    };

    let bytes = match decode_geometry_param(params.geometry.as_deref()) {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };

    let engine = state.engine.clone();
    let size = web::block(move || {
        engine
            .decode_geometry(&bytes)
            .and_then(|geometry| engine.measure(&geometry))
    })
    .await;

    match size {
        Ok(Ok(size)) => HttpResponse::Ok().json(size.rounded()),
        Ok(Err(e)) => engine_error(&e),
        Err(e) => {
            log::error!("Measure task failed: {e}");
            HttpResponse::InternalServerError().json(ApiError::new("Measure task failed"))
        }
    }
}

/// Runs `work` on the blocking pool. If the returned future is dropped
/// first (the client went away), `cancel` fires so the work stops at its
/// next check.
async fn run_cancellable<T, F>(
    cancel: &CancelToken,
    work: F,
) -> Result<Result<T, EngineError>, BlockingError>
where
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    let guard = cancel.drop_guard();
    let result = web::block(work).await;
    drop(guard.disarm());
    result
}

/// Criteria may arrive as an object or as JSON text holding one.
fn parse_criteria_value(value: serde_json::Value) -> Result<IntersectionCriteria, serde_json::Error> {
    match value {
        serde_json::Value::String(text) => IntersectionCriteria::from_json(&text),
        other => serde_json::from_value(other),
    }
}

fn decode_geometry_param(geometry: Option<&str>) -> Result<Vec<u8>, HttpResponse> {
    let Some(geometry) = geometry.map(str::trim).filter(|g| !g.is_empty()) else {
        return Err(bad_request("geometry parameter is required."));
    };

    STANDARD
        .decode(geometry)
        .map_err(|e| bad_request(format!("geometry parameter is not valid base64: {e}")))
}

fn bad_request(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ApiError::new(message))
}

fn engine_error(error: &EngineError) -> HttpResponse {
    let status =
        StatusCode::from_u16(error.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        log::error!("Request failed: {error}");
    } else {
        log::debug!("Rejected request: {error}");
    }

    HttpResponse::build(status).json(ApiError::new(error.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::{App, test};
    use geo::{Geometry, polygon};
    use wri_catalog::{GeoJsonFeatureClass, InMemoryMapService, LayerCatalog};
    use wri_engine::{EngineConfig, IntersectionEngine};
    use wri_geometry::wkb;
    use wri_intersect_models::{ApiIntersectResponse, FieldValue, SizeResult};

    use super::*;
    use crate::configure;

    const COUNTIES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "NAME": "CountyA" },
                "geometry": { "type": "Polygon", "coordinates": [[[2,2],[7,2],[7,7],[2,7],[2,2]]] }
            },
            {
                "type": "Feature",
                "properties": { "NAME": "CountyA" },
                "geometry": { "type": "Polygon", "coordinates": [[[8,8],[12,8],[12,12],[8,12],[8,8]]] }
            }
        ]
    }"#;

    const STREAMS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "NAME": "StreamX" },
                "geometry": { "type": "LineString", "coordinates": [[1,1],[5,1],[5,5]] }
            }
        ]
    }"#;

    fn state(timeout: Duration) -> web::Data<AppState> {
        let service = InMemoryMapService::new("Reference")
            .with_layer(
                "Counties",
                Arc::new(GeoJsonFeatureClass::from_geojson_str("counties", COUNTIES, 26912).unwrap()),
            )
            .with_layer(
                "Streams",
                Arc::new(GeoJsonFeatureClass::from_geojson_str("streams", STREAMS, 26912).unwrap()),
            );

        let engine = IntersectionEngine::new(
            Arc::new(LayerCatalog::build(&service).unwrap()),
            EngineConfig {
                measure_srid: 26912,
                ..EngineConfig::default()
            },
        )
        .unwrap();

        web::Data::new(AppState {
            engine,
            request_timeout: timeout,
        })
    }

    fn square_wkb() -> String {
        let square: Geometry<f64> = polygon![
            (x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)
        ]
        .into();
        STANDARD.encode(wkb::encode(&square, Some(26912)))
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(App::new().app_data($state).configure(configure)).await
        };
    }

    #[actix_web::test]
    async fn root_describes_service() {
        let app = app!(state(Duration::from_secs(60)));
        let req = test::TestRequest::get().uri("/").to_request();
        let body: ApiServiceInfo = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.description, "Extract intersection information");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }

    #[actix_web::test]
    async fn extracts_from_form() {
        let app = app!(state(Duration::from_secs(60)));
        let req = test::TestRequest::post()
            .uri("/ExtractIntersections")
            .set_form([
                ("geometry", square_wkb()),
                ("criteria", r#"{"0":["name"],"1":["NAME"]}"#.to_string()),
                ("f", "json".to_string()),
            ])
            .to_request();

        let body: ApiIntersectResponse = test::call_and_read_body_json(&app, req).await;

        let counties = &body["Counties"];
        assert_eq!(counties.len(), 1);
        assert_eq!(counties[0].attributes, vec![FieldValue::from("CountyA")]);
        assert!((counties[0].intersect - 29.0).abs() < 1e-9);

        let streams = &body["Streams"];
        assert!((streams[0].intersect - 8.0).abs() < 1e-9);
    }

    #[actix_web::test]
    async fn extracts_from_json_object() {
        let app = app!(state(Duration::from_secs(60)));
        let req = test::TestRequest::post()
            .uri("/ExtractIntersections")
            .set_json(serde_json::json!({
                "geometry": square_wkb(),
                "criteria": { "1": ["name"] },
            }))
            .to_request();

        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            body,
            serde_json::json!({
                "Streams": [{ "Attributes": ["StreamX"], "Intersect": 8.0 }]
            })
        );
    }

    #[actix_web::test]
    async fn missing_geometry_is_bad_request() {
        let app = app!(state(Duration::from_secs(60)));
        let req = test::TestRequest::post()
            .uri("/ExtractIntersections")
            .set_form([("criteria", r#"{"0":["name"]}"#)])
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ApiError = test::read_body_json(resp).await;
        assert_eq!(body, ApiError::new("geometry parameter is required."));
    }

    #[actix_web::test]
    async fn missing_criteria_is_bad_request() {
        let app = app!(state(Duration::from_secs(60)));
        let req = test::TestRequest::post()
            .uri("/ExtractIntersections")
            .set_json(serde_json::json!({ "geometry": square_wkb() }))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ApiError = test::read_body_json(resp).await;
        assert_eq!(body.message, "criteria parameter is required.");
        assert!(!body.success);
    }

    #[actix_web::test]
    async fn unknown_layer_is_bad_request() {
        let app = app!(state(Duration::from_secs(60)));
        let req = test::TestRequest::post()
            .uri("/ExtractIntersections")
            .set_json(serde_json::json!({
                "geometry": square_wkb(),
                "criteria": r#"{"7":["name"]}"#,
            }))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn invalid_base64_is_bad_request() {
        let app = app!(state(Duration::from_secs(60)));
        let req = test::TestRequest::post()
            .uri("/ExtractIntersections")
            .set_form([("geometry", "not base64!"), ("criteria", "{}")])
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn expired_deadline_is_unavailable() {
        let app = app!(state(Duration::ZERO));
        let req = test::TestRequest::post()
            .uri("/ExtractIntersections")
            .set_form([
                ("geometry", square_wkb()),
                ("criteria", r#"{"0":["name"]}"#.to_string()),
            ])
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn measures_areas_and_lengths() {
        let app = app!(state(Duration::from_secs(60)));
        let req = test::TestRequest::post()
            .uri("/AreasAndLengths")
            .set_form([("geometry", square_wkb())])
            .to_request();

        let body: SizeResult = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            body,
            SizeResult {
                area: 100.0,
                length: 40.0
            }
        );
    }

    #[actix_web::test]
    async fn lists_layers() {
        let app = app!(state(Duration::from_secs(60)));
        let req = test::TestRequest::get().uri("/layers").to_request();
        let body: Vec<ApiLayer> = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.len(), 2);
        assert_eq!(body[1].index, 1);
        assert_eq!(body[1].name, "Streams");
        assert_eq!(
            body[1].fields,
            vec![ApiLayerField {
                field: "NAME".to_string(),
                index: 0
            }]
        );
    }

    #[actix_web::test]
    async fn dropped_request_cancels_engine_work() {
        let cancel = CancelToken::with_timeout(Duration::from_secs(30));
        let worker = cancel.clone();
        let request = run_cancellable(&cancel, move || {
            while worker.check().is_ok() {
                std::thread::sleep(Duration::from_millis(1));
            }
            worker.check()
        });

        let abandoned = actix_rt::time::timeout(Duration::from_millis(50), request).await;
        assert!(abandoned.is_err());
        assert!(cancel.is_cancelled());
    }

    #[actix_web::test]
    async fn finished_work_leaves_token_untouched() {
        let cancel = CancelToken::new();
        let result = run_cancellable(&cancel, || Ok(7)).await.unwrap().unwrap();
        assert_eq!(result, 7);
        assert!(!cancel.is_cancelled());
    }
}
