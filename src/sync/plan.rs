//! The ordered list of operations a run will perform

use crate::image::ImageReference;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Pull,
    Retag,
    Push,
    DeleteOld,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Pull => "pull",
            OperationKind::Retag => "retag",
            OperationKind::Push => "push",
            OperationKind::DeleteOld => "delete-old",
        };
        f.write_str(name)
    }
}

/// One step of the plan
///
/// Every step knows both ends of the copy: `source` is the image as named
/// under the old prefix and `destination` its planned name under the new
/// prefix. [`PlannedOperation::target`] is the name the step acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedOperation {
    kind: OperationKind,
    source: ImageReference,
    destination: ImageReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    existing_digest: Option<String>,
}

impl PlannedOperation {
    fn new(kind: OperationKind, source: ImageReference, destination: ImageReference) -> Self {
        Self {
            kind,
            source,
            destination,
            existing_digest: None,
        }
    }

    pub fn pull(source: ImageReference, destination: ImageReference) -> Self {
        Self::new(OperationKind::Pull, source, destination)
    }

    pub fn retag(source: ImageReference, destination: ImageReference) -> Self {
        Self::new(OperationKind::Retag, source, destination)
    }

    /// Push `destination`; `existing_digest` is what the registry holds for it now
    pub fn push(
        source: ImageReference,
        destination: ImageReference,
        existing_digest: Option<String>,
    ) -> Self {
        Self {
            existing_digest,
            ..Self::new(OperationKind::Push, source, destination)
        }
    }

    pub fn delete_old(source: ImageReference, destination: ImageReference) -> Self {
        Self::new(OperationKind::DeleteOld, source, destination)
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn source(&self) -> &ImageReference {
        &self.source
    }

    pub fn destination(&self) -> &ImageReference {
        &self.destination
    }

    /// Image the container runtime is invoked on
    pub fn target(&self) -> &ImageReference {
        match self.kind {
            OperationKind::Push => &self.destination,
            OperationKind::Pull | OperationKind::Retag | OperationKind::DeleteOld => &self.source,
        }
    }

    pub fn existing_digest(&self) -> Option<&str> {
        self.existing_digest.as_deref()
    }

    /// `<kind> <source> -> <destination>`
    pub fn describe(&self) -> String {
        format!("{} {} -> {}", self.kind, self.source, self.destination)
    }
}

impl fmt::Display for PlannedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// All operations for one source image, in execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageChain {
    pub index: usize,
    pub source: ImageReference,
    pub operations: Vec<PlannedOperation>,
    /// Set when planning could not complete for this image; the chain is
    /// reported as failed with this cause instead of being run
    pub blocked: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    chains: Vec<ImageChain>,
}

impl SyncPlan {
    pub(crate) fn from_chains(chains: Vec<ImageChain>) -> Self {
        Self { chains }
    }

    /// Flattened operations in execution order
    pub fn operations(&self) -> impl Iterator<Item = &PlannedOperation> {
        self.chains.iter().flat_map(|chain| chain.operations.iter())
    }

    pub fn len(&self) -> usize {
        self.chains.iter().map(|chain| chain.operations.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Source images in plan order
    pub fn images(&self) -> Vec<&ImageReference> {
        self.chains.iter().map(|chain| &chain.source).collect()
    }

    pub fn chains(&self) -> &[ImageChain] {
        &self.chains
    }

    pub fn count(&self, kind: OperationKind) -> usize {
        self.operations().filter(|op| op.kind() == kind).count()
    }

    /// Chains that will be reported as failed without running
    pub fn blocked(&self) -> impl Iterator<Item = &ImageChain> {
        self.chains.iter().filter(|chain| chain.blocked.is_some())
    }
}
