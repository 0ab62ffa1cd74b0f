//! CRUD client for the console's resource areas
//!
//! Every area (properties, repairs, contracts, ...) is served by the same
//! client, which sends through the session manager so token refresh is
//! handled in one place. Records stay as JSON; the server owns their shape.

use serde_json::Value;

use crate::api::endpoints::read_error_message;
use crate::auth::{ApiRequest, SessionManager};
use crate::error::{AppError, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Properties,
    Repairs,
    /// Inventory items ("enseres") attached to a property
    Furnishings,
    Documents,
    Contracts,
    Tenants,
    Obligations,
    Payments,
    Notifications,
}

impl Resource {
    pub const ALL: [Resource; 9] = [
        Resource::Properties,
        Resource::Repairs,
        Resource::Furnishings,
        Resource::Documents,
        Resource::Contracts,
        Resource::Tenants,
        Resource::Obligations,
        Resource::Payments,
        Resource::Notifications,
    ];

    /// Collection path, relative to the API base URL
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Properties => "propiedades/",
            Resource::Repairs => "reparaciones/",
            Resource::Furnishings => "enseres/",
            Resource::Documents => "documentos/",
            Resource::Contracts => "contratos/",
            Resource::Tenants => "arrendatarios/",
            Resource::Obligations => "obligaciones/",
            Resource::Payments => "pagos/",
            Resource::Notifications => "notificaciones/",
        }
    }

    pub fn item_path(&self, id: &str) -> String {
        format!("{}{}/", self.path(), id.trim_matches('/'))
    }
}

#[derive(Clone)]
pub struct ResourceClient {
    session: SessionManager,
    resource: Resource,
}

impl ResourceClient {
    pub fn new(session: SessionManager, resource: Resource) -> Self {
        Self { session, resource }
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    /// List records. Accepts a bare array or a paginated `{"results": [...]}`.
    pub async fn list(&self, query: &[(&str, &str)]) -> Result<Vec<Value>, AppError> {
        let request = query.iter().fold(
            ApiRequest::get(self.resource.path()),
            |request, (key, value)| request.with_query(*key, *value),
        );

        match self.execute(request).await? {
            Value::Array(items) => Ok(items),
            Value::Object(mut page) => match page.remove("results") {
                Some(Value::Array(items)) => Ok(items),
                _ => Err(TransportError::UnexpectedResponse(format!(
                    "{} list is neither an array nor a page",
                    self.resource.path()
                ))
                .into()),
            },
            _ => Err(TransportError::UnexpectedResponse(format!(
                "{} list is neither an array nor a page",
                self.resource.path()
            ))
            .into()),
        }
    }

    pub async fn retrieve(&self, id: &str) -> Result<Value, AppError> {
        self.execute(ApiRequest::get(self.resource.item_path(id)))
            .await
    }

    pub async fn create(&self, body: Value) -> Result<Value, AppError> {
        self.execute(ApiRequest::post(self.resource.path(), body))
            .await
    }

    pub async fn update(&self, id: &str, body: Value) -> Result<Value, AppError> {
        self.execute(ApiRequest::put(self.resource.item_path(id), body))
            .await
    }

    pub async fn partial_update(&self, id: &str, body: Value) -> Result<Value, AppError> {
        self.execute(ApiRequest::patch(self.resource.item_path(id), body))
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.execute(ApiRequest::delete(self.resource.item_path(id)))
            .await
            .map(|_| ())
    }

    /// Send and decode. Empty bodies (204) decode to `Value::Null`.
    async fn execute(&self, request: ApiRequest) -> Result<Value, AppError> {
        let response = self.session.send(request).await?;
        let status = response.status();

        if !status.is_success() {
            let message = read_error_message(response).await;
            return Err(TransportError::Api {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body)
            .map_err(|e| TransportError::UnexpectedResponse(e.to_string()).into())
    }
}
