//! BatchService — turns a list of object descriptors into per-object
//! outcomes.
//!
//! Each object runs through precheck → existence check → resolve → issue
//! link on its own. Objects are evaluated concurrently (bounded by
//! `concurrency`) and the results come back in request order. A failure in
//! one object's pipeline is recorded on that object only; the batch itself
//! fails only for adapter negotiation or cancellation.

use crate::{
    models::batch::{
        Action, BatchOperation, BatchOutcome, Link, ObjectDescriptor, ObjectError,
        ObjectErrorKind, ObjectOutcome,
    },
    services::{existence::ExistenceChecker, link_issuer::LinkIssuer, resolver},
};
use futures::{StreamExt, stream};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Adapter used when the client does not advertise any.
pub const BASIC_TRANSFER: &str = "basic";

/// Batch-level failures. Everything else is reported per object.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("malformed batch request: {0}")]
    MalformedRequest(String),
    #[error("none of the requested transfer adapters {offered:?} are supported")]
    UnsupportedTransferAdapter { offered: Vec<String> },
    #[error("batch cancelled: server is shutting down")]
    Cancelled,
    #[error("batch did not complete within {0:?}")]
    TimedOut(Duration),
}

#[derive(Clone)]
pub struct BatchService {
    checker: Arc<dyn ExistenceChecker>,
    issuer: Arc<dyn LinkIssuer>,
    adapters: Vec<String>,
    concurrency: usize,
}

impl BatchService {
    /// Service supporting only the `basic` adapter. `concurrency` is clamped
    /// to at least one.
    pub fn new(
        checker: Arc<dyn ExistenceChecker>,
        issuer: Arc<dyn LinkIssuer>,
        concurrency: usize,
    ) -> Self {
        Self {
            checker,
            issuer,
            adapters: vec![BASIC_TRANSFER.to_string()],
            concurrency: concurrency.max(1),
        }
    }

    /// Pick the adapter for a batch: the first one the client lists that the
    /// server supports, or `basic` when the client lists none.
    pub fn negotiate_adapter(&self, offered: &[String]) -> Result<String, BatchError> {
        if offered.is_empty() {
            return Ok(BASIC_TRANSFER.to_string());
        }
        offered
            .iter()
            .find(|name| self.adapters.contains(name))
            .cloned()
            .ok_or_else(|| BatchError::UnsupportedTransferAdapter {
                offered: offered.to_vec(),
            })
    }

    /// Evaluate a batch.
    ///
    /// The returned outcomes line up 1:1 with `descriptors`. When `cancel`
    /// fires, in-flight evaluations are dropped and `Cancelled` is returned.
    pub async fn negotiate(
        &self,
        operation: BatchOperation,
        transfers: &[String],
        descriptors: Vec<ObjectDescriptor>,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome, BatchError> {
        let transfer = self.negotiate_adapter(transfers)?;
        let total = descriptors.len();

        let evaluations = stream::iter(descriptors)
            .map(|descriptor| self.evaluate(operation, descriptor))
            .buffered(self.concurrency)
            .collect::<Vec<_>>();

        let objects = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(%operation, objects = total, "batch cancelled before completion");
                return Err(BatchError::Cancelled);
            }
            objects = evaluations => objects,
        };

        let failed = objects.iter().filter(|o| o.is_error()).count();
        info!(
            %operation,
            transfer = %transfer,
            objects = total,
            failed,
            "batch negotiated"
        );

        Ok(BatchOutcome { transfer, objects })
    }

    async fn evaluate(
        &self,
        operation: BatchOperation,
        descriptor: ObjectDescriptor,
    ) -> ObjectOutcome {
        match self.actions_for(operation, &descriptor).await {
            Ok(actions) => ObjectOutcome::with_actions(descriptor, actions),
            Err(err) => {
                debug!(oid = %descriptor.oid, code = err.code(), "object rejected: {}", err.message);
                ObjectOutcome::failed(descriptor, err)
            }
        }
    }

    async fn actions_for(
        &self,
        operation: BatchOperation,
        descriptor: &ObjectDescriptor,
    ) -> Result<BTreeMap<Action, Link>, ObjectError> {
        let auth = resolver::precheck(descriptor)?;

        let existence = self.checker.check(&descriptor.oid).await.map_err(|err| {
            warn!(oid = %descriptor.oid, error = %err, "existence check failed");
            ObjectError::new(ObjectErrorKind::StoreUnavailable, "object store unavailable")
        })?;

        let action = resolver::resolve(operation, existence)?;
        let link = self
            .issuer
            .issue(&descriptor.oid, action, auth)
            .map_err(|err| ObjectError::new(ObjectErrorKind::Forbidden, err.to_string()))?;
        debug!(oid = %descriptor.oid, %action, "object resolved");

        let mut actions = BTreeMap::new();
        actions.insert(action, link);
        Ok(actions)
    }
}
