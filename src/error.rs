/// The gittuf error type.
#[derive(Debug, thiserror::Error)]
pub enum GitTufError {
    #[error("I/O error")]
    IOError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("malformed Git object: {0}")]
    MalformedObject(String),

    #[error("object {0} not found in repository")]
    ObjectNotFound(String),

    #[error("reference {0} not found in repository")]
    ReferenceNotFound(String),

    #[error("RSL entry expected, another object found instead")]
    NotRslEntry,

    #[error("RSL entry does not match requested ref")]
    RslEntryDoesNotMatchRef,

    #[error("unable to find RSL entry")]
    RslEntryNotFound,

    #[error("commit has not been recorded in the RSL")]
    NoRecordOfCommit,

    #[error("invalid policy tree structure")]
    InvalidPolicyTree,

    #[error("unable to find metadata file {0}; has it been initialized?")]
    MetadataNotFound(String),

    #[error("unreachable delegation metadata found in policy state")]
    DanglingDelegationMetadata,

    #[error("delegation entry {0} not found")]
    DelegationNotFound(String),

    #[error("accepted signatures do not meet threshold ({have} of {want})")]
    BelowThreshold { have: usize, want: usize },

    #[error("signature verification failed")]
    BadSignature,

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("signing identity expired at signature time")]
    ExpiredIdentity,

    #[error("unknown signing method: {0}")]
    UnknownSigningMethod(String),

    #[error("Ed25519 signature function error")]
    CryptoError(#[from] ed25519_compact::Error),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error(
        "verification failed for {ref_name}, entry {entry_id}, commit {commit_id}{path_part}: {cause}",
        path_part = .path.as_ref().map(|p| format!(", path {p}")).unwrap_or_default()
    )]
    UnauthorizedSignature {
        ref_name: String,
        entry_id: String,
        commit_id: String,
        path: Option<String>,
        cause: FailureCause,
    },

    #[error("concurrent update of reference {0}")]
    ConcurrentUpdate(String),

    #[error("cannot initialize policy namespace as it exists already")]
    PolicyExists,

    #[error("removing the key leaves the role below its signature threshold")]
    CannotMeetThreshold,

    #[error("unable to clone repository: {0}")]
    CloningFailed(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// The specific cause of a reference verification failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    /// The commit carries no signature but touches a protected path.
    Unsigned,
    /// The signature does not verify under any trusted key.
    WrongKey,
    /// No key trusted for the path signed the change.
    UnauthorizedPath,
    /// The ref has no RSL entry recording its current state.
    MissingRslEntry,
    /// An annotation refers to an entry marked as skipped.
    SkippedEntryReferenced,
    /// The policy state itself failed verification.
    PolicyVerificationFailed,
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureCause::Unsigned => "commit is unsigned",
            FailureCause::WrongKey => "signature not made by a trusted key",
            FailureCause::UnauthorizedPath => "no trusted key authorized the path",
            FailureCause::MissingRslEntry => "no RSL entry records the ref state",
            FailureCause::SkippedEntryReferenced => "entry was marked as skipped",
            FailureCause::PolicyVerificationFailed => "policy state failed verification",
        };
        f.write_str(s)
    }
}
