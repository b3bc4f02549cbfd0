//! Reqwest-backed client for the asset-inventory API.
//!
//! The client owns transport only: request bodies, paging, and flattening of
//! each record's attributes into dotted column names.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{Map, Value, json};
use tracing::{error, info, instrument};

use crate::config::InventoryApiConfig;
use crate::error::Result;
use crate::model::{INVENTORY_DEVICES_SOURCE, INVENTORY_USERS_SOURCE, Record, SourceTable};

/// Records requested per page.
pub const PAGE_LIMIT: usize = 100;

const DEVICE_TIMEOUT: Duration = Duration::from_secs(120);
const USER_TIMEOUT: Duration = Duration::from_secs(60);
const DEVICE_FILTER: &str =
    r#"(("adapters_data.rapid7_nexpose_adapter.last_seen" >= date("now-30d")))"#;

const DEVICE_FIELDS: &[&str] = &[
    "specific_data.data.unique_id",
    "specific_data.data.hostname",
    "specific_data.data.last_seen",
    "specific_data.data.name",
    "specific_data.data.last_used_users_ad_display_name_association",
    "labels",
    "specific_data.data.os.type",
    "adapters",
    "network_interfaces",
    "specific_data.data.network_interfaces.mac",
    "specific_data.data.network_interfaces.ips",
    "specific_data.data.public_ips",
    "specific_data.data.last_used_users",
    "specific_data.data.last_used_users_departments_association",
    "specific_data.data.last_used_users_mail_association",
    "specific_data.data.last_used_users_user_manager_association",
    "specific_data.data.last_used_users_user_manager_mail_association",
    "specific_data.data.connection_label",
    "specific_data.data.adapter_properties",
    "specific_data.data.tags",
    "specific_data.data.connected_devices.local_ifaces.ips",
    "specific_data.data.connected_devices.remote_ifaces.ips",
    "specific_data.data.direct_connected_devices.local_ifaces.ips",
    "specific_data.data.direct_connected_devices.remote_ifaces.ips",
];

const USER_FIELDS: &[&str] = &[
    "adapters",
    "specific_data.data.username",
    "specific_data.data.domain",
    "specific_data.data.first_name",
    "specific_data.data.last_name",
    "specific_data.data.mail",
    "specific_data.data.last_seen",
    "labels",
    "specific_data.data.user_manager",
    "specific_data.data.user_department",
    "specific_data.data.connection_label",
];

/// Entity collection exposed by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Devices,
    Users,
}

impl Entity {
    fn path(self) -> &'static str {
        match self {
            Entity::Devices => "devices",
            Entity::Users => "users",
        }
    }

    fn fields(self) -> &'static [&'static str] {
        match self {
            Entity::Devices => DEVICE_FIELDS,
            Entity::Users => USER_FIELDS,
        }
    }

    fn timeout(self) -> Duration {
        match self {
            Entity::Devices => DEVICE_TIMEOUT,
            Entity::Users => USER_TIMEOUT,
        }
    }

    /// Source name the fetched table is registered under.
    pub fn source_name(self) -> &'static str {
        match self {
            Entity::Devices => INVENTORY_DEVICES_SOURCE,
            Entity::Users => INVENTORY_USERS_SOURCE,
        }
    }
}

/// Builds the entity-request body for one page.
pub fn request_body(entity: Entity, offset: usize, limit: usize) -> Value {
    let mut attributes = Map::new();
    if entity == Entity::Devices {
        attributes.insert("filter".to_string(), Value::String(DEVICE_FILTER.to_string()));
    }
    attributes.insert("page".to_string(), json!({"offset": offset, "limit": limit}));
    attributes.insert(
        "fields".to_string(),
        json!({ entity.path(): entity.fields() }),
    );
    json!({
        "data": {
            "type": "entity_request_schema",
            "attributes": attributes,
        }
    })
}

/// Inventory API client bound to one base URL and credential pair.
pub struct InventoryClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl InventoryClient {
    /// Returns `None` when the configuration lacks any credential.
    pub fn from_config(config: &InventoryApiConfig) -> Result<Option<Self>> {
        let Some((url, key, secret)) = config.credentials() else {
            return Ok(None);
        };
        Ok(Some(Self {
            client: Client::builder().build()?,
            base_url: url.trim_end_matches('/').to_string(),
            api_key: key.to_string(),
            api_secret: secret.to_string(),
        }))
    }

    /// Fetches every page of `entity`. A failed request ends paging and
    /// keeps what was already retrieved.
    #[instrument(level = "info", skip(self))]
    pub fn fetch(&self, entity: Entity) -> SourceTable {
        let url = format!("{}/api/{}", self.base_url, entity.path());
        let records = fetch_paginated(PAGE_LIMIT, |offset, limit| {
            info!(%url, offset, "requesting inventory page");
            self.fetch_page(&url, entity, offset, limit)
        });
        if records.is_empty() {
            info!("inventory API returned no records");
        } else {
            info!(records = records.len(), "retrieved inventory records");
        }
        SourceTable::from_records(entity.source_name(), records)
    }

    fn fetch_page(
        &self,
        url: &str,
        entity: Entity,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Value>> {
        let response = self
            .client
            .post(url)
            .timeout(entity.timeout())
            .header("api-key", &self.api_key)
            .header("api-secret", &self.api_secret)
            .json(&request_body(entity, offset, limit))
            .send()?
            .error_for_status()?;
        let body: Value = response.json()?;
        Ok(page_attributes(&body))
    }
}

/// Fetches in pages of `limit` until an empty or short page, or an error.
pub fn fetch_paginated<F>(limit: usize, mut fetch_page: F) -> Vec<Record>
where
    F: FnMut(usize, usize) -> Result<Vec<Value>>,
{
    let mut records = Vec::new();
    let mut offset = 0;
    loop {
        let page = match fetch_page(offset, limit) {
            Ok(page) => page,
            Err(err) => {
                error!(offset, %err, "inventory API call failed");
                break;
            }
        };
        if page.is_empty() {
            info!("no more records returned");
            break;
        }
        let page_len = page.len();
        records.extend(page.iter().map(flatten_attributes));
        if page_len < limit {
            info!("last page reached");
            break;
        }
        offset += limit;
    }
    records
}

/// Extracts the `attributes` object of every entry under `data`.
pub fn page_attributes(body: &Value) -> Vec<Value> {
    body.get("data")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("attributes").cloned())
                .collect()
        })
        .unwrap_or_default()
}

/// Flattens nested objects into dotted keys. Arrays are kept as values.
pub fn flatten_attributes(attributes: &Value) -> Record {
    let mut record = Record::new();
    if let Value::Object(map) = attributes {
        flatten_into(&mut record, None, map);
    }
    record
}

fn flatten_into(record: &mut Record, prefix: Option<&str>, map: &Map<String, Value>) {
    for (key, value) in map {
        let column = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(nested) if !nested.is_empty() => {
                flatten_into(record, Some(&column), nested);
            }
            other => {
                record.insert(column, other.clone());
            }
        }
    }
}
