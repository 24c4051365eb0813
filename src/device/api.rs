//! Platform API channel
//!
//! Sends the verification command to the device through the platform's
//! `cliCutThrough` custom script. The command names the command file the
//! platform pushes to the network element, e.g. `ShowInactivityTimer`.

use async_trait::async_trait;

use super::DeviceQueryChannel;
use crate::common::{Error, Result};
use crate::navigator::{ExecuteRequest, NavigatorClient, NetworkElement};

/// Queries a network element through the platform API
pub struct ApiChannel {
    client: NavigatorClient,
    network_element: NetworkElement,
}

impl ApiChannel {
    pub fn new(client: NavigatorClient, network_element: NetworkElement) -> Self {
        Self {
            client,
            network_element,
        }
    }
}

#[async_trait]
impl DeviceQueryChannel for ApiChannel {
    async fn query(&self, command: &str) -> Result<String> {
        let cmd_file = command.trim();
        if cmd_file.is_empty() {
            return Err(Error::query_failed(command, "empty command"));
        }

        let request = ExecuteRequest::cli_cut_through(cmd_file, &self.network_element);
        self.client
            .execute_script(&request)
            .await
            .map_err(|e| Error::query_failed(command, e.to_string()))
    }
}
