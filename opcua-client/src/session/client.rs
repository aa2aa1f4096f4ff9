use std::{str::FromStr, sync::Arc};

use log::{debug, error};
use tokio::{pin, select};

use crate::{
    transport::{
        tcp::{TcpConnector, TransportConfiguration},
        TransportPollResult,
    },
    AsyncSecureChannel, ClientConfig, ClientEndpoint, IdentityToken,
};
use opcua_core::{
    comms::url::{
        hostname_from_url, is_opc_ua_binary_url, is_valid_opc_ua_url, server_url_from_endpoint_url,
        url_matches_except_host, url_with_replaced_hostname,
    },
    sync::RwLock,
    ResponseMessage,
};
use opcua_crypto::{CertificateStore, SecurityPolicy};
use opcua_types::{
    ApplicationDescription, ContextOwned, EndpointDescription, FindServersOnNetworkRequest,
    FindServersOnNetworkResponse, FindServersRequest, GetEndpointsRequest, MessageSecurityMode,
    NamespaceMap, RegisterServerRequest, RegisteredServer, StatusCode, UAString,
};

use super::{
    connection::SessionBuilder, process_service_result, process_unexpected_response, Session,
    SessionEventLoop, SessionInfo,
};

/// Entry point for ad-hoc discovery requests and for building [`Session`]s. Holds
/// configuration and the certificate store shared by every connection it opens.
pub struct Client {
    pub(super) config: ClientConfig,
    certificate_store: Arc<RwLock<CertificateStore>>,
}

impl Client {
    /// Create a new client from config. Does not make any connection to the server.
    ///
    /// If `config.create_sample_keypair` is set and `config.pki_dir` has no own certificate
    /// yet (or one whose `ApplicationUri` no longer matches the config), a self-signed
    /// application instance certificate is generated and persisted there immediately.
    /// Otherwise the certificate and private key, if any, are loaded lazily the first time a
    /// secure channel needs them.
    pub fn new(config: ClientConfig) -> Self {
        let certificate_store = CertificateStore::new(config.pki_dir.clone())
            .with_trust_unknown_certs(config.trust_server_certs);
        if config.create_sample_keypair {
            let hostname = config
                .application_uri
                .strip_prefix("urn:")
                .and_then(|rest| rest.split(':').next())
                .filter(|host| !host.is_empty())
                .unwrap_or("localhost");
            if let Err(e) = certificate_store.ensure_own_certificate(
                &config.application_uri,
                &config.application_name,
                hostname,
            ) {
                error!("Could not create sample application instance certificate: {e}");
            }
        }
        Self {
            config,
            certificate_store: Arc::new(RwLock::new(certificate_store)),
        }
    }

    /// Get a new session builder that can be used to build a session dynamically.
    pub fn session_builder(&self) -> SessionBuilder<'_, (), ()> {
        SessionBuilder::<'_, (), ()>::new(&self.config)
    }

    /// Connects to a named endpoint defined in the `ClientConfig` and creates a [`Session`]
    /// for it. `GetEndpoints` is called on the server first, to confirm the endpoint is
    /// actually supported.
    pub async fn connect_to_endpoint_id(
        &mut self,
        endpoint_id: impl Into<String>,
    ) -> Result<(Arc<Session>, SessionEventLoop), StatusCode> {
        Ok(self
            .session_builder()
            .with_endpoints(self.get_server_endpoints().await?)
            .connect_to_endpoint_id(endpoint_id)
            .map_err(|e| {
                error!("{}", e);
                StatusCode::BadConfigurationError
            })?
            .build(self.certificate_store.clone()))
    }

    /// Connects to an ad-hoc server endpoint description, matching it against the server's
    /// advertised endpoints first.
    ///
    /// Returns a [`Session`] and its [`SessionEventLoop`]; the event loop must be polled for
    /// the session to actually establish a connection or make progress on requests.
    pub async fn connect_to_matching_endpoint(
        &mut self,
        endpoint: impl Into<EndpointDescription>,
        user_identity_token: IdentityToken,
    ) -> Result<(Arc<Session>, SessionEventLoop), StatusCode> {
        let endpoint = endpoint.into();
        let server_url = endpoint.endpoint_url.as_ref();

        Ok(self
            .session_builder()
            .with_endpoints(self.get_server_endpoints_from_url(server_url).await?)
            .connect_to_matching_endpoint(endpoint)?
            .user_identity_token(user_identity_token)
            .build(self.certificate_store.clone()))
    }

    /// Connects to a server directly using the given [`EndpointDescription`], without first
    /// validating it against the server's advertised endpoints.
    pub fn connect_to_endpoint_directly(
        &mut self,
        endpoint: impl Into<EndpointDescription>,
        identity_token: IdentityToken,
    ) -> Result<(Arc<Session>, SessionEventLoop), String> {
        Ok(self
            .session_builder()
            .connect_to_endpoint_directly(endpoint)?
            .user_identity_token(identity_token)
            .build(self.certificate_store.clone()))
    }

    /// Creates a new [`Session`] using the default endpoint specified in the config.
    pub async fn connect_to_default_endpoint(
        &mut self,
    ) -> Result<(Arc<Session>, SessionEventLoop), String> {
        Ok(self
            .session_builder()
            .with_endpoints(
                self.get_server_endpoints()
                    .await
                    .map_err(|e| format!("Failed to fetch server endpoints: {e}"))?,
            )
            .connect_to_default_endpoint()?
            .build(self.certificate_store.clone()))
    }

    /// Create a secure channel using the provided [`SessionInfo`], for one-shot discovery
    /// requests. Once a session is created it manages its own channel instead.
    fn channel_from_session_info(
        &self,
        session_info: SessionInfo,
        channel_lifetime: u32,
    ) -> AsyncSecureChannel {
        AsyncSecureChannel::new(
            self.certificate_store.clone(),
            session_info,
            self.config.session_retry_policy(),
            self.config.performance.ignore_clock_skew,
            Arc::default(),
            TransportConfiguration {
                max_pending_incoming: 5,
                send_buffer_size: self.config.decoding_options.max_chunk_size,
                recv_buffer_size: self.config.decoding_options.max_incoming_chunk_size,
                max_message_size: self.config.decoding_options.max_message_size,
                max_chunk_count: self.config.decoding_options.max_chunk_count,
            },
            Box::new(TcpConnector),
            channel_lifetime,
            Arc::new(RwLock::new(ContextOwned::new_default(
                NamespaceMap::new(),
                self.config.decoding_options.as_comms_decoding_options(),
            ))),
        )
    }

    /// Gets the [`ClientEndpoint`] information for the default endpoint, as defined by the
    /// configuration.
    pub fn default_endpoint(&self) -> Result<ClientEndpoint, String> {
        let default_endpoint_id = self.config.default_endpoint.clone();
        if default_endpoint_id.is_empty() {
            Err("No default endpoint has been specified".to_string())
        } else if let Some(endpoint) = self.config.endpoints.get(&default_endpoint_id) {
            Ok(endpoint.clone())
        } else {
            Err(format!(
                "Cannot find default endpoint with id {}",
                default_endpoint_id
            ))
        }
    }

    /// Get the list of endpoints for the server at the configured default endpoint.
    pub async fn get_server_endpoints(&self) -> Result<Vec<EndpointDescription>, StatusCode> {
        if let Ok(default_endpoint) = self.default_endpoint() {
            if let Ok(server_url) = server_url_from_endpoint_url(&default_endpoint.url) {
                self.get_server_endpoints_from_url(server_url).await
            } else {
                error!(
                    "Cannot create a server url from the specified endpoint url {}",
                    default_endpoint.url
                );
                Err(StatusCode::BadUnexpectedError)
            }
        } else {
            error!("There is no default endpoint, so cannot get endpoints");
            Err(StatusCode::BadUnexpectedError)
        }
    }

    async fn get_server_endpoints_inner(
        &self,
        endpoint: &EndpointDescription,
        channel: &AsyncSecureChannel,
        locale_ids: Option<Vec<UAString>>,
        profile_uris: Option<Vec<UAString>>,
    ) -> Result<Vec<EndpointDescription>, StatusCode> {
        let request = GetEndpointsRequest {
            request_header: channel.make_request_header(self.config.request_timeout),
            endpoint_url: endpoint.endpoint_url.clone(),
            locale_ids,
            profile_uris,
        };
        let response = channel.send(request, self.config.request_timeout).await?;
        if let ResponseMessage::GetEndpoints(response) = response {
            process_service_result(&response.response_header)?;
            Ok(response.endpoints.unwrap_or_default())
        } else {
            Err(process_unexpected_response(response))
        }
    }

    /// Get the list of endpoints for the server at the given URL.
    pub async fn get_server_endpoints_from_url(
        &self,
        server_url: impl Into<String>,
    ) -> Result<Vec<EndpointDescription>, StatusCode> {
        self.get_endpoints(server_url, &[], &[]).await
    }

    /// Get the list of endpoints for the server at the given URL, filtered by locale and
    /// profile URI.
    pub async fn get_endpoints(
        &self,
        server_url: impl Into<String>,
        locale_ids: &[&str],
        profile_uris: &[&str],
    ) -> Result<Vec<EndpointDescription>, StatusCode> {
        let server_url = server_url.into();
        if !is_opc_ua_binary_url(&server_url) {
            return Err(StatusCode::BadTcpEndpointUrlInvalid);
        }
        let endpoint = EndpointDescription::from(server_url.as_ref());
        let session_info = SessionInfo {
            endpoint: endpoint.clone(),
            user_identity_token: IdentityToken::Anonymous,
            preferred_locales: Vec::new(),
        };
        let channel = self.channel_from_session_info(session_info, self.config.channel_lifetime);

        let mut evt_loop = channel.connect().await?;

        let send_fut = self.get_server_endpoints_inner(
            &endpoint,
            &channel,
            if locale_ids.is_empty() {
                None
            } else {
                Some(locale_ids.iter().map(|i| (*i).into()).collect())
            },
            if profile_uris.is_empty() {
                None
            } else {
                Some(profile_uris.iter().map(|i| (*i).into()).collect())
            },
        );
        pin!(send_fut);

        let res = loop {
            select! {
                r = evt_loop.poll() => {
                    if let TransportPollResult::Closed(e) = r {
                        return Err(e);
                    }
                },
                res = &mut send_fut => break res
            }
        };

        channel.close_channel().await;
        while !matches!(evt_loop.poll().await, TransportPollResult::Closed(_)) {}

        res
    }

    async fn find_servers_inner(
        &self,
        endpoint_url: String,
        channel: &AsyncSecureChannel,
        locale_ids: Option<Vec<UAString>>,
        server_uris: Option<Vec<UAString>>,
    ) -> Result<Vec<ApplicationDescription>, StatusCode> {
        let request = FindServersRequest {
            request_header: channel.make_request_header(self.config.request_timeout),
            endpoint_url: endpoint_url.into(),
            locale_ids,
            server_uris,
        };

        let response = channel.send(request, self.config.request_timeout).await?;
        if let ResponseMessage::FindServers(response) = response {
            process_service_result(&response.response_header)?;
            Ok(response.servers.unwrap_or_default())
        } else {
            Err(process_unexpected_response(response))
        }
    }

    /// Connects to a discovery server and asks for a list of available servers.
    pub async fn find_servers(
        &self,
        discovery_endpoint_url: impl Into<String>,
        locale_ids: Option<Vec<UAString>>,
        server_uris: Option<Vec<UAString>>,
    ) -> Result<Vec<ApplicationDescription>, StatusCode> {
        let discovery_endpoint_url = discovery_endpoint_url.into();
        debug!("find_servers, {}", discovery_endpoint_url);
        let endpoint = EndpointDescription::from(discovery_endpoint_url.as_ref());
        let session_info = SessionInfo {
            endpoint: endpoint.clone(),
            user_identity_token: IdentityToken::Anonymous,
            preferred_locales: Vec::new(),
        };
        let channel = self.channel_from_session_info(session_info, self.config.channel_lifetime);

        let mut evt_loop = channel.connect().await?;

        let send_fut =
            self.find_servers_inner(discovery_endpoint_url, &channel, locale_ids, server_uris);
        pin!(send_fut);

        let res = loop {
            select! {
                r = evt_loop.poll() => {
                    if let TransportPollResult::Closed(e) = r {
                        return Err(e);
                    }
                },
                res = &mut send_fut => break res
            }
        };

        channel.close_channel().await;
        while !matches!(evt_loop.poll().await, TransportPollResult::Closed(_)) {}

        res
    }

    async fn find_servers_on_network_inner(
        &self,
        starting_record_id: u32,
        max_records_to_return: u32,
        server_capability_filter: Option<Vec<UAString>>,
        channel: &AsyncSecureChannel,
    ) -> Result<FindServersOnNetworkResponse, StatusCode> {
        let request = FindServersOnNetworkRequest {
            request_header: channel.make_request_header(self.config.request_timeout),
            starting_record_id,
            max_records_to_return,
            server_capability_filter,
        };

        let response = channel.send(request, self.config.request_timeout).await?;
        if let ResponseMessage::FindServersOnNetwork(response) = response {
            process_service_result(&response.response_header)?;
            Ok(*response)
        } else {
            Err(process_unexpected_response(response))
        }
    }

    /// Connects to a discovery server and asks for a list of available servers on the network.
    pub async fn find_servers_on_network(
        &self,
        discovery_endpoint_url: impl Into<String>,
        starting_record_id: u32,
        max_records_to_return: u32,
        server_capability_filter: Option<Vec<UAString>>,
    ) -> Result<FindServersOnNetworkResponse, StatusCode> {
        let discovery_endpoint_url = discovery_endpoint_url.into();
        debug!("find_servers_on_network, {}", discovery_endpoint_url);
        let endpoint = EndpointDescription::from(discovery_endpoint_url.as_ref());
        let session_info = SessionInfo {
            endpoint: endpoint.clone(),
            user_identity_token: IdentityToken::Anonymous,
            preferred_locales: Vec::new(),
        };
        let channel = self.channel_from_session_info(session_info, self.config.channel_lifetime);

        let mut evt_loop = channel.connect().await?;

        let send_fut = self.find_servers_on_network_inner(
            starting_record_id,
            max_records_to_return,
            server_capability_filter,
            &channel,
        );
        pin!(send_fut);

        let res = loop {
            select! {
                r = evt_loop.poll() => {
                    if let TransportPollResult::Closed(e) = r {
                        return Err(e);
                    }
                },
                res = &mut send_fut => break res
            }
        };

        channel.close_channel().await;
        while !matches!(evt_loop.poll().await, TransportPollResult::Closed(_)) {}

        res
    }

    /// Find an endpoint in `endpoints` matching the given URL, security policy and mode,
    /// substituting the hostname the client actually dialed for the one the server advertised.
    pub fn find_matching_endpoint(
        endpoints: &[EndpointDescription],
        endpoint_url: &str,
        security_policy: SecurityPolicy,
        security_mode: MessageSecurityMode,
    ) -> Option<EndpointDescription> {
        if security_policy == SecurityPolicy::Unknown {
            panic!("Cannot match against unknown security policy");
        }

        let mut matching_endpoint = endpoints
            .iter()
            .find(|e| {
                security_mode == e.security_mode
                    && security_policy == SecurityPolicy::from_uri(e.security_policy_uri.as_ref())
                    && url_matches_except_host(endpoint_url, e.endpoint_url.as_ref())
            })
            .cloned()?;

        let hostname = hostname_from_url(endpoint_url).ok()?;
        let new_endpoint_url =
            url_with_replaced_hostname(matching_endpoint.endpoint_url.as_ref(), &hostname).ok()?;

        // The server may advertise an endpoint whose hostname is inaccessible to the client,
        // so substitute the hostname the client actually supplied.
        matching_endpoint.endpoint_url = new_endpoint_url.into();
        Some(matching_endpoint)
    }

    /// Determine if the client recognizes the security policy of this endpoint.
    pub fn is_supported_endpoint(&self, endpoint: &EndpointDescription) -> bool {
        if let Ok(security_policy) = SecurityPolicy::from_str(endpoint.security_policy_uri.as_ref())
        {
            !matches!(security_policy, SecurityPolicy::Unknown)
        } else {
            false
        }
    }

    async fn register_server_inner(
        &self,
        server: RegisteredServer,
        channel: &AsyncSecureChannel,
    ) -> Result<(), StatusCode> {
        let request = RegisterServerRequest {
            request_header: channel.make_request_header(self.config.request_timeout),
            server,
        };
        let response = channel.send(request, self.config.request_timeout).await?;
        if let ResponseMessage::RegisterServer(response) = response {
            process_service_result(&response.response_header)?;
            Ok(())
        } else {
            Err(process_unexpected_response(response))
        }
    }

    /// Registers this application with a discovery server, picking the endpoint with the
    /// highest security level among those the client supports.
    pub async fn register_server(
        &mut self,
        discovery_endpoint_url: impl Into<String>,
        server: RegisteredServer,
    ) -> Result<(), StatusCode> {
        let discovery_endpoint_url = discovery_endpoint_url.into();
        if !is_valid_opc_ua_url(&discovery_endpoint_url) {
            error!(
                "Discovery endpoint url \"{}\" is not a valid OPC UA url",
                discovery_endpoint_url
            );
            return Err(StatusCode::BadTcpEndpointUrlInvalid);
        }

        debug!("register_server({}, {:?})", discovery_endpoint_url, server);
        let endpoints = self
            .get_server_endpoints_from_url(discovery_endpoint_url.clone())
            .await?;
        if endpoints.is_empty() {
            return Err(StatusCode::BadUnexpectedError);
        }

        let Some(endpoint) = endpoints
            .iter()
            .filter(|e| self.is_supported_endpoint(e))
            .max_by(|a, b| a.security_level.cmp(&b.security_level))
        else {
            error!("Cannot find an endpoint that we call register server on");
            return Err(StatusCode::BadUnexpectedError);
        };

        let session_info = SessionInfo {
            endpoint: endpoint.clone(),
            user_identity_token: IdentityToken::Anonymous,
            preferred_locales: Vec::new(),
        };
        let channel = self.channel_from_session_info(session_info, self.config.channel_lifetime);

        let mut evt_loop = channel.connect().await?;

        let send_fut = self.register_server_inner(server, &channel);
        pin!(send_fut);

        let res = loop {
            select! {
                r = evt_loop.poll() => {
                    if let TransportPollResult::Closed(e) = r {
                        return Err(e);
                    }
                },
                res = &mut send_fut => break res
            }
        };

        channel.close_channel().await;
        while !matches!(evt_loop.poll().await, TransportPollResult::Closed(_)) {}

        res
    }

    /// Get the certificate store.
    pub fn certificate_store(&self) -> &Arc<RwLock<CertificateStore>> {
        &self.certificate_store
    }
}
