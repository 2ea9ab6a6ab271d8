//! Hetzner Cloud API payloads (only the fields servertide reads or sends)

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Labels = HashMap<String, String>;

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub id: u64,
    pub name: String,
    pub status: String,
    pub server_type: NamedRef,
    #[serde(default)]
    pub datacenter: Option<Datacenter>,
    #[serde(default)]
    pub labels: Labels,
}

impl Server {
    pub fn location(&self) -> Option<&str> {
        self.datacenter.as_ref().map(|dc| dc.location.name.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Datacenter {
    pub location: NamedRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub id: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub protection: Protection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Protection {
    #[serde(default)]
    pub delete: bool,
}

/// Asynchronous provider-side operation
#[derive(Debug, Clone, Deserialize)]
pub struct Action {
    pub id: u64,
    pub command: String,
    /// `running`, `success` or `error`
    pub status: String,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FloatingIp {
    pub id: u64,
    pub ip: String,
    #[serde(default)]
    pub server: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SshKey {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

// Response envelopes

/// `meta` block of list responses
#[derive(Debug, Default, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<u32>,
    pub next_page: Option<u32>,
}

/// A list response that may continue on further pages.
pub trait Paginated {
    type Item;

    fn into_page(self) -> (Vec<Self::Item>, Option<u32>);
}

macro_rules! impl_paginated {
    ($response:ty, $field:ident, $item:ty) => {
        impl Paginated for $response {
            type Item = $item;

            fn into_page(self) -> (Vec<$item>, Option<u32>) {
                (self.$field, self.meta.pagination.next_page)
            }
        }
    };
}

#[derive(Debug, Deserialize)]
pub struct ServersResponse {
    pub servers: Vec<Server>,
    #[serde(default)]
    pub meta: Meta,
}

#[derive(Debug, Deserialize)]
pub struct ServerResponse {
    pub server: Server,
}

#[derive(Debug, Deserialize)]
pub struct ImagesResponse {
    pub images: Vec<Image>,
    #[serde(default)]
    pub meta: Meta,
}

#[derive(Debug, Deserialize)]
pub struct ActionResponse {
    pub action: Action,
}

#[derive(Debug, Deserialize)]
pub struct CreateServerResponse {
    pub server: Server,
    pub action: Action,
}

#[derive(Debug, Deserialize)]
pub struct CreateImageResponse {
    pub image: Image,
    pub action: Action,
}

#[derive(Debug, Deserialize)]
pub struct FloatingIpsResponse {
    pub floating_ips: Vec<FloatingIp>,
    #[serde(default)]
    pub meta: Meta,
}

#[derive(Debug, Deserialize)]
pub struct SshKeysResponse {
    pub ssh_keys: Vec<SshKey>,
    #[serde(default)]
    pub meta: Meta,
}

impl_paginated!(ServersResponse, servers, Server);
impl_paginated!(ImagesResponse, images, Image);
impl_paginated!(FloatingIpsResponse, floating_ips, FloatingIp);
impl_paginated!(SshKeysResponse, ssh_keys, SshKey);

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ApiErrorBody,
}

// Request bodies

#[derive(Debug, Clone, Serialize)]
pub struct CreateServerRequest {
    pub name: String,
    pub server_type: String,
    /// Image ID or name
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start_after_create: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<u64>,
    pub user_data: String,
    pub labels: Labels,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateImageRequest {
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub labels: Labels,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignFloatingIpRequest {
    pub server: u64,
}
