//! Typed Mindat API operations over a [`Transport`]

use crate::config::AppConfig;
use crate::fetcher::endpoints::Endpoints;
use crate::fetcher::pagination::{to_locality, to_object, LocalityPages, MineralPages, Paged};
use crate::fetcher::{FetcherError, FetcherResult, QueryParams, Transport};
use crate::LocalityId;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Mindat API client
#[derive(Clone)]
pub struct MindatClient {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    page_size: u32,
}

impl MindatClient {
    /// Create a client
    pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints, page_size: u32) -> Self {
        Self {
            transport,
            endpoints,
            page_size,
        }
    }

    /// Create a client from configuration
    pub fn from_config(config: &AppConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(transport, Endpoints::from_config(config), config.page_size)
    }

    /// Records requested per page
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Endpoint table
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Start a locality search walk with `params` plus `page_size`
    ///
    /// Every call begins again from page one.
    pub fn search_localities(&self, params: &[(String, String)]) -> FetcherResult<LocalityPages> {
        let url = self.endpoints.localities_url()?;
        let mut query: QueryParams = params.to_vec();
        query.push(("page_size".to_string(), self.page_size.to_string()));
        debug!(url = %url, params = ?query, "Starting locality search");
        Ok(Paged::new(self.transport.clone(), url, query, to_locality))
    }

    /// Fetch one locality's detail record with expanded geomaterials
    pub async fn get_locality_detail(&self, id: &LocalityId) -> FetcherResult<Value> {
        let url = self.endpoints.locality_detail_url(id)?;
        let params = vec![
            ("format".to_string(), "json".to_string()),
            ("expand".to_string(), "geomaterials".to_string()),
        ];
        let value = self
            .transport
            .get_json(&url, &params)
            .await
            .map_err(FetcherError::from_transport)?;
        if !value.is_object() {
            return Err(FetcherError::InvalidResponse(format!(
                "detail for locality {id} is not a JSON object"
            )));
        }
        Ok(value)
    }

    /// Start a walk over the minerals recorded at one locality
    pub fn list_locality_minerals(&self, id: &LocalityId) -> FetcherResult<MineralPages> {
        let url = self.endpoints.locality_minerals_url()?;
        let params = vec![
            ("format".to_string(), "json".to_string()),
            ("locality".to_string(), id.to_string()),
            ("page_size".to_string(), self.page_size.to_string()),
        ];
        Ok(Paged::new(self.transport.clone(), url, params, to_object))
    }

    /// Fetch every mineral record of one locality
    pub async fn collect_locality_minerals(&self, id: &LocalityId) -> FetcherResult<Vec<Value>> {
        self.list_locality_minerals(id)?
            .collect_all()
            .await
            .map_err(|e| match e {
                FetcherError::Transport(t) => FetcherError::from_transport(t),
                other => other,
            })
    }
}
