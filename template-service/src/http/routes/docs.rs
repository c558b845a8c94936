//! OpenAPI document and the Basic-auth guarded Swagger UI

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::Html;
use axum::{routing::get, Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

use crate::config::SwaggerSettings;
use crate::di::AppContainer;
use crate::error::AppError;

const SWAGGER_JS: &str = "https://cdn.jsdelivr.net/npm/swagger-ui-dist@5.9.0/swagger-ui-bundle.js";
const SWAGGER_CSS: &str = "https://cdn.jsdelivr.net/npm/swagger-ui-dist@5.9.0/swagger-ui.css";
const TAGS_PLUGIN_JS: &str =
    "https://unpkg.com/swagger-ui-plugin-hierarchical-tags@1.0.4/build/index.js";

/// Login/password pair from an `Authorization: Basic ...` header.
fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("credentials missing"))?;

    let (scheme, param) = header.split_once(' ').unwrap_or((header, ""));
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(AppError::unauthorized("credentials missing"));
    }

    let invalid = || AppError::unauthorized("invalid credentials");
    let decoded = STANDARD.decode(param.trim()).map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;
    let (login, password) = decoded.split_once(':').ok_or_else(invalid)?;
    Ok((login.to_string(), password.to_string()))
}

fn authenticate(headers: &HeaderMap, swagger: &SwaggerSettings) -> Result<(), AppError> {
    let (login, password) = basic_credentials(headers)?;
    if login != swagger.doc_login || password != swagger.doc_password {
        return Err(AppError::unauthorized("wrong login or password"));
    }
    Ok(())
}

fn swagger_html(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<link type="text/css" rel="stylesheet" href="{css}">
<title>{title}</title>
</head>
<body>
<div id="swagger-ui"></div>
<script src="{plugin}"></script>
<script src="{js}"></script>
<script>
const ui = SwaggerUIBundle({{
    url: '/openapi.json',
    dom_id: '#swagger-ui',
    plugins: [HierarchicalTagsPlugin],
    hierarchicalTagSeparator: /[:|]/,
    defaultModelsExpandDepth: -1,
    displayRequestDuration: true,
    deepLinking: true,
    presets: [
        SwaggerUIBundle.presets.apis,
        SwaggerUIBundle.SwaggerUIStandalonePreset
    ],
}})
</script>
</body>
</html>
"#,
        css = SWAGGER_CSS,
        plugin = TAGS_PLUGIN_JS,
        js = SWAGGER_JS,
        title = title,
    )
}

/// GET /docs
async fn docs(
    State(container): State<AppContainer>,
    headers: HeaderMap,
) -> Result<Html<String>, AppError> {
    authenticate(&headers, &container.settings.swagger)?;
    Ok(Html(swagger_html(&container.settings.common.project_name)))
}

/// GET /openapi.json
async fn openapi_json(State(container): State<AppContainer>) -> Json<Value> {
    Json(openapi_document(&container.settings.common.project_name))
}

fn error_responses(statuses: &[u16]) -> Value {
    let mut responses = serde_json::Map::new();
    for status in statuses {
        let description = match *status {
            401 => "Authentication error",
            403 => "Not enough permissions for the operation",
            404 => "Item not found",
            409 => "Item could not be stored: a logic or database constraint rejected it",
            422 => "Validation error",
            _ => "Error",
        };
        responses.insert(
            status.to_string(),
            json!({
                "description": description,
                "content": {
                    "application/json": {
                        "schema": { "$ref": "#/components/schemas/ErrorSchema" }
                    }
                }
            }),
        );
    }
    Value::Object(responses)
}

fn operation(
    tag: &str,
    summary: &str,
    description: &str,
    ok_status: u16,
    ok_schema: Option<Value>,
    errors: &[u16],
) -> Value {
    let mut responses = error_responses(errors);
    let ok = match ok_schema {
        Some(schema) => json!({
            "description": "Successful Response",
            "content": { "application/json": { "schema": schema } }
        }),
        None => json!({ "description": "Successful Response" }),
    };
    if let Value::Object(map) = &mut responses {
        map.insert(ok_status.to_string(), ok);
    }

    json!({
        "tags": [tag],
        "summary": summary,
        "description": description,
        "responses": responses,
    })
}

fn with_body(mut op: Value, schema: &str) -> Value {
    op["requestBody"] = json!({
        "required": true,
        "content": {
            "application/json": {
                "schema": { "$ref": format!("#/components/schemas/{}", schema) }
            }
        }
    });
    op
}

fn with_params(mut op: Value, params: Value) -> Value {
    op["parameters"] = params;
    op
}

fn schema_ref(name: &str) -> Value {
    json!({ "$ref": format!("#/components/schemas/{}", name) })
}

fn list_of(name: &str) -> Value {
    json!({ "type": "array", "items": schema_ref(name) })
}

fn id_param(name: &str) -> Value {
    json!([{
        "name": name,
        "in": "path",
        "required": true,
        "schema": { "type": "integer" }
    }])
}

fn paging_params() -> Value {
    json!([
        { "name": "offset", "in": "query", "required": false, "schema": { "type": "integer", "minimum": 0 } },
        { "name": "limit", "in": "query", "required": false, "schema": { "type": "integer", "minimum": 0 } }
    ])
}

/// The OpenAPI 3.1 description of the public API.
pub fn openapi_document(title: &str) -> Value {
    const ROLES: &str = "Client|Roles";
    const USERS: &str = "Client|Users";

    json!({
        "openapi": "3.1.0",
        "info": {
            "title": title,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "tags": [
            { "name": "Client", "description": "Client endpoints" },
            { "name": ROLES, "description": "User roles", "parent": "Client" },
            { "name": USERS, "description": "Users", "parent": "Client" },
        ],
        "paths": {
            "/api/v1/roles": {
                "get": with_params(operation(
                    ROLES,
                    "Get all roles",
                    "List every role with its id, name and creation date",
                    200, Some(list_of("RoleSchema")), &[422],
                ), paging_params()),
                "post": with_body(operation(
                    ROLES,
                    "Create role",
                    "Create a new role. The role name must be unique",
                    200, Some(schema_ref("RoleSchema")), &[409, 422],
                ), "CreateRoleSchema"),
            },
            "/api/v1/roles/{role_id}": {
                "get": with_params(operation(
                    ROLES,
                    "Get role by ID",
                    "Get one role by its identifier",
                    200, Some(schema_ref("RoleSchema")), &[404, 422],
                ), id_param("role_id")),
            },
            "/api/v1/users": {
                "get": with_params(operation(
                    USERS,
                    "Get all users",
                    "List every user with id, name, role and timestamps",
                    200, Some(list_of("UserSchema")), &[422],
                ), paging_params()),
                "post": with_body(operation(
                    USERS,
                    "Create user",
                    "Create a new user. The user name must be unique and the role must exist",
                    200, Some(schema_ref("UserSchema")), &[409, 422],
                ), "CreateUserSchema"),
            },
            "/api/v1/users/{user_id}": {
                "get": with_params(operation(
                    USERS,
                    "Get user by ID",
                    "Get one user by its identifier",
                    200, Some(schema_ref("UserSchema")), &[404, 422],
                ), id_param("user_id")),
                "patch": with_body(with_params(operation(
                    USERS,
                    "Update user",
                    "Change the name and/or role of a user. Absent fields are left unchanged",
                    200, Some(schema_ref("UserSchema")), &[404, 409, 422],
                ), id_param("user_id")), "UpdateUserSchema"),
                "delete": with_params(operation(
                    USERS,
                    "Delete user",
                    "Delete a user by its identifier. This cannot be undone",
                    204, None, &[404, 422],
                ), id_param("user_id")),
            },
        },
        "components": components(),
    })
}

/// Component schemas shared by the operations.
fn components() -> Value {
    json!({
        "schemas": {
            "ErrorSchema": {
                "type": "object",
                "required": ["message", "code"],
                "properties": {
                    "message": { "type": "string" },
                    "code": {
                        "type": "string",
                        "enum": [
                            "internal_error", "bad_request", "invalid_value", "unauthorized",
                            "token_expired", "forbidden", "invalid_refresh_token",
                            "authentication_required_error"
                        ]
                    }
                }
            },
            "RoleSchema": {
                "type": "object",
                "required": ["id", "role_name", "created_at"],
                "properties": {
                    "id": { "type": "integer" },
                    "role_name": { "type": "string" },
                    "created_at": { "type": "string", "format": "date-time" }
                }
            },
            "CreateRoleSchema": {
                "type": "object",
                "required": ["role_name"],
                "additionalProperties": false,
                "properties": {
                    "role_name": { "type": "string", "minLength": 1, "maxLength": 255 }
                }
            },
            "UserSchema": {
                "type": "object",
                "required": ["id", "user_name", "created_at"],
                "properties": {
                    "id": { "type": "integer" },
                    "user_name": { "type": "string" },
                    "role_id": { "type": ["integer", "null"] },
                    "created_at": { "type": "string", "format": "date-time" },
                    "updated_at": { "type": ["string", "null"], "format": "date-time" }
                }
            },
            "CreateUserSchema": {
                "type": "object",
                "required": ["user_name", "role_id"],
                "additionalProperties": false,
                "properties": {
                    "user_name": { "type": "string", "minLength": 6, "maxLength": 255 },
                    "role_id": { "type": "integer", "minimum": 1 }
                }
            },
            "UpdateUserSchema": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "user_name": { "type": "string", "minLength": 6, "maxLength": 255 },
                    "role_id": { "type": "integer", "minimum": 1 }
                }
            }
        }
    })
}

/// Documentation routes
pub fn router() -> Router<AppContainer> {
    Router::new()
        .route("/docs", get(docs))
        .route("/openapi.json", get(openapi_json))
}
