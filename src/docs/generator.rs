//! Documentation Generator: an OpenAPI document derived from the registry.

use std::collections::BTreeMap;

use axum::http::Method;
use rand::distributions::Alphanumeric;
use rand::Rng;
use utoipa::openapi::{
    content::ContentBuilder,
    info::InfoBuilder,
    path::{
        HttpMethod, Operation, OperationBuilder, Parameter, ParameterBuilder, ParameterIn,
        PathItemBuilder, PathsBuilder,
    },
    request_body::RequestBodyBuilder,
    response::{ResponseBuilder, ResponsesBuilder},
    schema::{ArrayBuilder, ComponentsBuilder, KnownFormat, ObjectBuilder, Schema, SchemaFormat, SchemaType, Type},
    security::{HttpAuthScheme, HttpBuilder, SecurityRequirement, SecurityScheme},
    server::Server,
    OpenApi, OpenApiBuilder, Ref, RefOr, Required,
};

use crate::case::slugify;
use crate::config::ApiInfo;
use crate::descriptor::{Action, EndpointDescriptor, FieldDescriptor, FieldType, ModelShape, ResourceDescriptor};
use crate::registry::Registry;

const JSON: &str = "application/json";
const BEARER: &str = "bearerAuth";
const NOT_FOUND: &str = "NotFound";
const UNAUTHORIZED: &str = "Unauthorized";
const SERVER_ERROR: &str = "ServerError";

fn typed(ty: Type) -> ObjectBuilder {
    ObjectBuilder::new().schema_type(SchemaType::Type(ty))
}

fn formatted(ty: Type, format: SchemaFormat) -> RefOr<Schema> {
    RefOr::T(Schema::Object(typed(ty).format(Some(format)).build()))
}

fn custom(ty: Type, name: &str) -> RefOr<Schema> {
    formatted(ty, SchemaFormat::Custom(name.to_string()))
}

fn plain(ty: Type) -> RefOr<Schema> {
    RefOr::T(Schema::Object(typed(ty).build()))
}

fn reference(name: &str) -> RefOr<Schema> {
    RefOr::Ref(Ref::from_schema_name(name))
}

fn array_of(item: RefOr<Schema>) -> RefOr<Schema> {
    RefOr::T(Schema::Array(ArrayBuilder::new().items(item).build()))
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect()
}

/// Accumulates schemas and operations over one pass of the registry.
#[derive(Default)]
struct Generator {
    schemas: BTreeMap<String, RefOr<Schema>>,
    paths: BTreeMap<String, Vec<(HttpMethod, Operation)>>,
}

impl Generator {
    /// Insert `schema` under `name`. An identical schema already present is reused; a
    /// different one keeps the name and this one gets a random suffix.
    fn put_schema(&mut self, name: &str, schema: RefOr<Schema>) -> String {
        let same = |existing: &RefOr<Schema>| {
            match (serde_json::to_value(existing), serde_json::to_value(&schema)) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            }
        };
        let key = match self.schemas.get(name) {
            None => name.to_string(),
            Some(existing) if same(existing) => return name.to_string(),
            Some(_) => {
                let mut key = format!("{}{}", name, random_suffix());
                while self.schemas.contains_key(&key) {
                    key = format!("{}{}", name, random_suffix());
                }
                tracing::debug!(schema = name, renamed = %key, "schema name collision");
                key
            }
        };
        self.schemas.insert(key.clone(), schema);
        key
    }

    fn field_schema(&mut self, field: &FieldDescriptor) -> RefOr<Schema> {
        match &field.field_type {
            FieldType::Int8 => custom(Type::Integer, "int8"),
            FieldType::Int16 => custom(Type::Integer, "int16"),
            FieldType::Int32 => formatted(Type::Integer, SchemaFormat::KnownFormat(KnownFormat::Int32)),
            FieldType::Int64 => formatted(Type::Integer, SchemaFormat::KnownFormat(KnownFormat::Int64)),
            FieldType::UInt8 => custom(Type::Integer, "uint8"),
            FieldType::UInt16 => custom(Type::Integer, "uint16"),
            FieldType::UInt32 => custom(Type::Integer, "uint32"),
            FieldType::UInt64 => custom(Type::Integer, "uint64"),
            FieldType::Float32 => formatted(Type::Number, SchemaFormat::KnownFormat(KnownFormat::Float)),
            FieldType::Float64 => formatted(Type::Number, SchemaFormat::KnownFormat(KnownFormat::Double)),
            FieldType::Bool => plain(Type::Boolean),
            FieldType::String => plain(Type::String),
            FieldType::ObjectId => custom(Type::String, "objectid"),
            FieldType::Decimal => custom(Type::String, "decimal"),
            FieldType::Timestamp => formatted(Type::String, SchemaFormat::KnownFormat(KnownFormat::DateTime)),
            FieldType::Any => RefOr::T(Schema::Object(
                ObjectBuilder::new().schema_type(SchemaType::AnyValue).build(),
            )),
            FieldType::Object(shape) => reference(&self.nested_schema(shape)),
            FieldType::Array(shape) => array_of(reference(&self.nested_schema(shape))),
        }
    }

    fn nested_schema(&mut self, shape: &ModelShape) -> String {
        self.shape_schema(&format!("{}Model", shape.name), shape)
    }

    fn object_schema(&mut self, shape: &ModelShape) -> RefOr<Schema> {
        let mut object = typed(Type::Object);
        for field in shape.wire_fields() {
            let Some(wire) = field.wire_key.as_deref() else {
                continue;
            };
            object = object.property(wire, self.field_schema(field));
            if field.required {
                object = object.required(wire);
            }
        }
        RefOr::T(Schema::Object(object.build()))
    }

    fn shape_schema(&mut self, name: &str, shape: &ModelShape) -> String {
        let schema = self.object_schema(shape);
        self.put_schema(name, schema)
    }

    fn envelope(result: RefOr<Schema>) -> RefOr<Schema> {
        RefOr::T(Schema::Object(
            typed(Type::Object)
                .property("message", plain(Type::String))
                .property("status_code", plain(Type::Integer))
                .property("status", plain(Type::Boolean))
                .property("result", result)
                .build(),
        ))
    }

    fn list_result(item: RefOr<Schema>) -> RefOr<Schema> {
        RefOr::T(Schema::Object(
            typed(Type::Object)
                .property("items", array_of(item))
                .property("total", plain(Type::Integer))
                .property("start", plain(Type::Integer))
                .build(),
        ))
    }

    fn parameter(name: &str, location: ParameterIn, required: bool, schema: RefOr<Schema>) -> Parameter {
        ParameterBuilder::new()
            .name(name)
            .parameter_in(location)
            .required(if required { Required::True } else { Required::False })
            .schema(Some(schema))
            .build()
    }

    fn query_parameters(&mut self, fields: &[&FieldDescriptor]) -> Vec<Parameter> {
        fields
            .iter()
            .filter_map(|f| {
                let wire = f.wire_key.as_deref()?;
                Some(Self::parameter(wire, ParameterIn::Query, false, self.field_schema(f)))
            })
            .collect()
    }

    fn add_operation(
        &mut self,
        endpoint: &EndpointDescriptor,
        summary: String,
        tags: Vec<String>,
        parameters: Vec<Parameter>,
        request: Option<(String, String)>,
        success: Option<(u16, String, RefOr<Schema>)>,
    ) {
        let mut responses = ResponsesBuilder::new();
        if let Some((status, description, schema)) = success {
            responses = responses.response(
                status.to_string(),
                ResponseBuilder::new()
                    .description(description)
                    .content(JSON, ContentBuilder::new().schema(Some(schema)).build())
                    .build(),
            );
        }
        let mut errors = vec![("404", "item not found", NOT_FOUND), ("500", "internal server error", SERVER_ERROR)];
        if !endpoint.public {
            errors.push(("401", "Unauthorized", UNAUTHORIZED));
        }
        for (status, description, schema) in errors {
            responses = responses.response(
                status,
                ResponseBuilder::new()
                    .description(description)
                    .content(JSON, ContentBuilder::new().schema(Some(reference(schema))).build())
                    .build(),
            );
        }

        let mut op = OperationBuilder::new()
            .operation_id(Some(endpoint.name.clone()))
            .summary(Some(summary))
            .description(endpoint.description.clone())
            .responses(responses.build());
        for tag in tags {
            op = op.tag(tag);
        }
        for parameter in parameters {
            op = op.parameter(parameter);
        }
        if let Some((description, schema)) = request {
            op = op.request_body(Some(
                RequestBodyBuilder::new()
                    .description(Some(description))
                    .content(JSON, ContentBuilder::new().schema(Some(reference(&schema))).build())
                    .required(Some(Required::True))
                    .build(),
            ));
        }
        if !endpoint.public {
            op = op.security(SecurityRequirement::new(BEARER, Vec::<String>::new()));
        }

        let method = match endpoint.method {
            Method::POST => HttpMethod::Post,
            Method::PUT => HttpMethod::Put,
            Method::DELETE => HttpMethod::Delete,
            Method::PATCH => HttpMethod::Patch,
            _ => HttpMethod::Get,
        };
        self.paths
            .entry(endpoint.doc_path.clone())
            .or_default()
            .push((method, op.build()));
    }

    fn resource(&mut self, resource: &ResourceDescriptor) {
        let name = resource.name.as_str();
        let schema = self.shape_schema(name, &resource.shape);
        let item = reference(&schema);

        for endpoint in &resource.endpoints {
            let mut tags = endpoint.tags.clone();
            let mut parameters = Vec::new();
            if let (Some(param), Some(primary)) = (endpoint.path_param.as_deref(), resource.primary()) {
                parameters.push(Self::parameter(param, ParameterIn::Path, true, self.field_schema(primary)));
            }

            let (summary, request, success) = match endpoint.action {
                Action::Get => (format!("Returns a single {}", name), None, (200, item.clone())),
                Action::Update => {
                    tags.push("Update Item".into());
                    let request = (format!("Update a {}", name), schema.clone());
                    (format!("Update a {}", name), Some(request), (200, item.clone()))
                }
                Action::Delete => {
                    tags.push("Delete Item".into());
                    let affected = RefOr::T(Schema::Object(
                        typed(Type::Object).property("affected", plain(Type::Integer)).build(),
                    ));
                    (format!("Delete a {}", name), None, (200, affected))
                }
                Action::List => {
                    tags.push("List Items".into());
                    let filterable: Vec<&FieldDescriptor> = resource.filterable_fields().collect();
                    parameters.extend(self.query_parameters(&filterable));
                    if !resource.flags.limit_locked {
                        parameters.push(Self::parameter("limit", ParameterIn::Query, false, plain(Type::Integer)));
                    }
                    parameters.push(Self::parameter("offset", ParameterIn::Query, false, plain(Type::Integer)));
                    (format!("Returns all {}", name), None, (200, Self::list_result(item.clone())))
                }
                Action::Create => {
                    tags.push("Create Item".into());
                    let request = (format!("Create a new {}", name), schema.clone());
                    (format!("Create a new {}", name), Some(request), (201, item.clone()))
                }
                Action::Aggregate | Action::Custom => {
                    self.custom(endpoint, Some(name));
                    continue;
                }
            };
            let (status, result) = success;
            self.add_operation(
                endpoint,
                endpoint.display_name.clone().unwrap_or(summary),
                tags,
                parameters,
                request,
                Some((status, "Response".into(), Self::envelope(result))),
            );
        }
    }

    /// Aggregation and free-standing endpoints.
    fn custom(&mut self, endpoint: &EndpointDescriptor, resource: Option<&str>) {
        let key = slugify(endpoint.title());
        let summary = endpoint
            .display_name
            .clone()
            .or_else(|| endpoint.description.clone())
            .unwrap_or_else(|| match resource {
                Some(name) if endpoint.action == Action::Aggregate => format!("{} Aggregate", name),
                _ => format!("Returns a single {}", endpoint.title()),
            });

        let parameters = match &endpoint.query_shape {
            Some(shape) => self.query_parameters(&shape.wire_fields().collect::<Vec<_>>()),
            None => Vec::new(),
        };
        let request = endpoint.request_shape.as_ref().map(|shape| {
            let schema = self.shape_schema(&format!("Request{}", key), shape);
            (format!("{} model", endpoint.title()), schema)
        });
        let success = endpoint.response_shape.as_ref().map(|shape| {
            let schema = reference(&self.shape_schema(&format!("Response{}", key), shape));
            let result = if endpoint.action == Action::Aggregate {
                array_of(schema)
            } else {
                schema
            };
            (200, format!("{} model", endpoint.title()), Self::envelope(result))
        });
        self.add_operation(endpoint, summary, endpoint.tags.clone(), parameters, request, success);
    }

    /// Runs first so operation error responses can refer to the fixed names.
    fn error_schemas(&mut self) {
        let not_found = typed(Type::Object)
            .property("message", plain(Type::String))
            .property("status_code", plain(Type::Integer));
        let unauthorized = typed(Type::Object)
            .property("message", plain(Type::String))
            .property("error", plain(Type::String))
            .property("status_code", plain(Type::Integer));
        let server_error = typed(Type::Object)
            .property("message", plain(Type::String))
            .property("error", plain(Type::Object))
            .property("status_code", plain(Type::Integer));
        for (name, schema) in [(NOT_FOUND, not_found), (UNAUTHORIZED, unauthorized), (SERVER_ERROR, server_error)] {
            self.put_schema(name, RefOr::T(Schema::Object(schema.build())));
        }
    }

    fn finish(self, info: &ApiInfo) -> OpenApi {
        let mut paths = PathsBuilder::new();
        for (path, operations) in self.paths {
            let mut item = PathItemBuilder::new();
            for (method, operation) in operations {
                item = item.operation(method, operation);
            }
            paths = paths.path(path, item.build());
        }

        let mut components = ComponentsBuilder::new();
        for (name, schema) in self.schemas {
            components = components.schema(name, schema);
        }
        components = components.security_scheme(
            BEARER,
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );

        let servers: Vec<Server> = info.servers.iter().map(Server::new).collect();
        OpenApiBuilder::new()
            .info(
                InfoBuilder::new()
                    .title(&info.title)
                    .version(&info.version)
                    .description(info.description.clone())
                    .build(),
            )
            .servers((!servers.is_empty()).then_some(servers))
            .paths(paths.build())
            .components(Some(components.build()))
            .build()
    }
}

/// Build the API document for every registered resource and free-standing endpoint.
pub fn generate(registry: &Registry, info: &ApiInfo) -> OpenApi {
    let mut generator = Generator::default();
    generator.error_schemas();
    for resource in registry.resources() {
        generator.resource(resource);
    }
    for endpoint in registry.endpoints() {
        generator.custom(endpoint, None);
    }
    tracing::debug!(
        schemas = generator.schemas.len(),
        paths = generator.paths.len(),
        "documentation generated"
    );
    generator.finish(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldDef, FieldTypeConfig as T, ModelDef, ResourceConfig};
    use crate::descriptor::build_shape;
    use serde_json::Value;

    fn registry() -> Registry {
        let address = ModelDef::record("Address").field(FieldDef::new("City", T::String));
        let model = ModelDef::record("Widget")
            .field(FieldDef::new("Name", T::String).required())
            .field(FieldDef::new("Ticker", T::String).filter())
            .field(FieldDef::new("Home", T::Object(address.clone())))
            .field(FieldDef::new("Previous", T::Array(address)));
        let mut reg = Registry::new();
        reg.register_resource(ResourceDescriptor::build(ResourceConfig::new(model)).unwrap())
            .unwrap();
        reg
    }

    fn document(reg: &Registry) -> Value {
        serde_json::to_value(generate(reg, &ApiInfo::default())).unwrap()
    }

    #[test]
    fn nested_records_become_referenced_schemas() {
        let doc = document(&registry());
        let schemas = &doc["components"]["schemas"];
        assert!(schemas.get("AddressModel").is_some());
        assert_eq!(
            schemas["Widget"]["properties"]["home"]["$ref"],
            "#/components/schemas/AddressModel"
        );
        assert_eq!(
            schemas["Widget"]["properties"]["previous"]["items"]["$ref"],
            "#/components/schemas/AddressModel"
        );
        for fixed in [NOT_FOUND, UNAUTHORIZED, SERVER_ERROR] {
            assert!(schemas.get(fixed).is_some(), "{} missing", fixed);
        }
    }

    #[test]
    fn regeneration_is_stable() {
        let reg = registry();
        let first = document(&reg);
        let second = document(&reg);
        assert_eq!(first, second);
        let names: Vec<_> = first["components"]["schemas"]
            .as_object()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with("AddressModel"))
            .cloned()
            .collect();
        assert_eq!(names, vec!["AddressModel".to_string()]);
    }

    #[test]
    fn colliding_names_with_different_structure_get_a_suffix() {
        let mut generator = Generator::default();
        let a = build_shape(&ModelDef::record("Point").field(FieldDef::new("X", T::Int32))).unwrap();
        let b = build_shape(&ModelDef::record("Point").field(FieldDef::new("Label", T::String))).unwrap();
        assert_eq!(generator.nested_schema(&a), "PointModel");
        assert_eq!(generator.nested_schema(&a), "PointModel");
        let renamed = generator.nested_schema(&b);
        assert!(renamed.starts_with("PointModel"));
        assert_eq!(renamed.len(), "PointModel".len() + 6);
    }

    #[test]
    fn resources_named_like_error_schemas_are_renamed() {
        let mut reg = Registry::new();
        let model = ModelDef::record("NotFound").field(FieldDef::new("Reason", T::String));
        reg.register_resource(ResourceDescriptor::build(ResourceConfig::new(model)).unwrap())
            .unwrap();
        let doc = document(&reg);
        let schemas = &doc["components"]["schemas"];
        assert!(schemas[NOT_FOUND]["properties"].get("status_code").is_some());
        assert!(schemas[NOT_FOUND]["properties"].get("reason").is_none());

        let item = doc["paths"]["/api/not_found/{id}"]["get"]["responses"]["200"]["content"][JSON]["schema"]
            ["properties"]["result"]["$ref"]
            .as_str()
            .unwrap();
        let renamed = item.trim_start_matches("#/components/schemas/");
        assert_ne!(renamed, NOT_FOUND);
        assert!(renamed.starts_with(NOT_FOUND));
        assert!(schemas[renamed]["properties"].get("reason").is_some());
    }

    #[test]
    fn private_endpoints_carry_security_and_401() {
        let doc = document(&registry());
        let get = &doc["paths"]["/api/widget/{id}"]["get"];
        assert!(get["responses"].get("401").is_some());
        assert!(get["responses"].get("404").is_some());
        assert!(get["security"][0].get(BEARER).is_some());
        assert_eq!(get["parameters"][0]["name"], "id");
        assert_eq!(get["parameters"][0]["in"], "path");

        let list = &doc["paths"]["/api/widget/"]["get"];
        let params: Vec<_> = list["parameters"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(params, vec!["ticker", "limit", "offset"]);
        assert!(doc["paths"]["/api/widget/"]["post"]["responses"].get("201").is_some());
    }

    #[test]
    fn public_endpoints_have_no_security() {
        let mut reg = Registry::new();
        let model = ModelDef::record("Note").field(FieldDef::new("Body", T::String));
        reg.register_resource(ResourceDescriptor::build(ResourceConfig::new(model).public(true)).unwrap())
            .unwrap();
        let doc = document(&reg);
        let get = &doc["paths"]["/api/note/{id}"]["get"];
        assert!(get.get("security").is_none());
        assert!(get["responses"].get("401").is_none());
    }
}
