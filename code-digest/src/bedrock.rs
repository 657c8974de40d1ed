#![doc = "Flow invoker integration: bridges the core `FlowInvoker` trait to the Bedrock Agent Runtime `InvokeFlow` API."]
//
//! # Bedrock flow client
//!
//! [`BedrockFlowInvoker`] sends one document to a Bedrock flow and exposes the
//! response event stream as the core's [`FlowEventStream`].
//!
//! - The document is sent to the `FlowInputNode` input node, output `document`.
//! - Output events carrying a string document become [`FlowEvent::Output`].
//! - SDK errors are mapped to a [`RemoteErrorKind`] by matching the typed
//!   service error variants, so retry decisions never look at message text.
//!
//! The client is built once per run with [`BedrockFlowInvoker::from_env`] and
//! handed to the analysis client; nothing here is process-global.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_bedrockagentruntime::error::{DisplayErrorContext, SdkError};
use aws_sdk_bedrockagentruntime::operation::invoke_flow::InvokeFlowError;
use aws_sdk_bedrockagentruntime::types::error::FlowResponseStreamError;
use aws_sdk_bedrockagentruntime::types::{
    FlowInput, FlowInputContent, FlowOutputContent, FlowResponseStream,
};
use aws_sdk_bedrockagentruntime::Client;
use aws_smithy_types::Document;
use futures::StreamExt;

use code_digest_core::contract::{
    FlowEvent, FlowEventStream, FlowInvoker, FlowRequest, InvokeError, RemoteErrorKind,
};

pub const FLOW_INPUT_NODE: &str = "FlowInputNode";
pub const FLOW_INPUT_NODE_OUTPUT: &str = "document";

pub struct BedrockFlowInvoker {
    client: Client,
}

impl BedrockFlowInvoker {
    /// Build a client from the default AWS credential chain for `region`.
    pub async fn from_env(region: &str) -> Self {
        let conf = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        tracing::info!(region, "Initialized Bedrock flow client");
        Self::new(Client::new(&conf))
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FlowInvoker for BedrockFlowInvoker {
    async fn invoke_flow(&self, request: &FlowRequest) -> Result<FlowEventStream, InvokeError> {
        tracing::debug!(
            flow_id = %request.flow_identifier,
            flow_alias_id = %request.flow_alias_identifier,
            bytes = request.document.len(),
            "Invoking flow"
        );
        let input = FlowInput::builder()
            .node_name(FLOW_INPUT_NODE)
            .node_output_name(FLOW_INPUT_NODE_OUTPUT)
            .content(FlowInputContent::Document(Document::String(
                request.document.clone(),
            )))
            .build()
            .map_err(|e| InvokeError::new(RemoteErrorKind::Validation, e.to_string()))?;

        let output = self
            .client
            .invoke_flow()
            .flow_identifier(&request.flow_identifier)
            .flow_alias_identifier(&request.flow_alias_identifier)
            .inputs(input)
            .send()
            .await
            .map_err(|e| {
                let err = invoke_error(e);
                tracing::error!(kind = %err.kind, error = %err.message, "InvokeFlow request failed");
                err
            })?;

        // Ends after the first stream error; a failed receiver is not resumed.
        let events = futures::stream::unfold(Some(output.response_stream), |state| async move {
            let mut receiver = state?;
            match receiver.recv().await {
                Ok(Some(event)) => Some((Ok(flow_event(event)), Some(receiver))),
                Ok(None) => None,
                Err(e) => Some((Err(stream_error(e)), None)),
            }
        });
        Ok(events.boxed())
    }
}

fn flow_event(event: FlowResponseStream) -> FlowEvent {
    match event {
        FlowResponseStream::FlowOutputEvent(output) => match output.content() {
            Some(FlowOutputContent::Document(Document::String(text))) => {
                FlowEvent::Output(Some(text.clone()))
            }
            Some(other) => {
                tracing::debug!(content = ?other, "Ignoring non-text flow output");
                FlowEvent::Output(None)
            }
            None => FlowEvent::Output(None),
        },
        FlowResponseStream::FlowCompletionEvent(done) => {
            FlowEvent::Completion(format!("{:?}", done.completion_reason()))
        }
        _ => FlowEvent::Other,
    }
}

fn invoke_error(err: SdkError<InvokeFlowError>) -> InvokeError {
    let message = DisplayErrorContext(&err).to_string();
    let kind = match err.as_service_error() {
        Some(InvokeFlowError::AccessDeniedException(_)) => RemoteErrorKind::AccessDenied,
        Some(InvokeFlowError::InternalServerException(_)) => RemoteErrorKind::InternalServer,
        Some(InvokeFlowError::ThrottlingException(_)) => RemoteErrorKind::Throttling,
        Some(InvokeFlowError::ValidationException(_)) => RemoteErrorKind::Validation,
        Some(InvokeFlowError::ResourceNotFoundException(_)) => RemoteErrorKind::ResourceNotFound,
        Some(InvokeFlowError::ConflictException(_)) => RemoteErrorKind::Conflict,
        Some(InvokeFlowError::DependencyFailedException(_)) => RemoteErrorKind::DependencyFailed,
        Some(InvokeFlowError::BadGatewayException(_)) => RemoteErrorKind::BadGateway,
        Some(InvokeFlowError::ServiceQuotaExceededException(_)) => {
            RemoteErrorKind::ServiceQuotaExceeded
        }
        Some(_) => RemoteErrorKind::Unknown,
        None => RemoteErrorKind::Transport,
    };
    InvokeError::new(kind, message)
}

fn stream_error<R>(err: SdkError<FlowResponseStreamError, R>) -> InvokeError
where
    R: std::fmt::Debug + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    let kind = match &err {
        SdkError::ServiceError(service) => match service.err() {
            FlowResponseStreamError::AccessDeniedException(_) => RemoteErrorKind::AccessDenied,
            FlowResponseStreamError::InternalServerException(_) => RemoteErrorKind::InternalServer,
            FlowResponseStreamError::ThrottlingException(_) => RemoteErrorKind::Throttling,
            FlowResponseStreamError::ValidationException(_) => RemoteErrorKind::Validation,
            FlowResponseStreamError::ResourceNotFoundException(_) => {
                RemoteErrorKind::ResourceNotFound
            }
            FlowResponseStreamError::ConflictException(_) => RemoteErrorKind::Conflict,
            FlowResponseStreamError::DependencyFailedException(_) => {
                RemoteErrorKind::DependencyFailed
            }
            FlowResponseStreamError::BadGatewayException(_) => RemoteErrorKind::BadGateway,
            FlowResponseStreamError::ServiceQuotaExceededException(_) => {
                RemoteErrorKind::ServiceQuotaExceeded
            }
            _ => RemoteErrorKind::Unknown,
        },
        SdkError::ResponseError(_) => RemoteErrorKind::Decode,
        _ => RemoteErrorKind::Transport,
    };
    tracing::error!(kind = %kind, error = %message, "Flow response stream failed");
    InvokeError::new(kind, message)
}
