/// Process exit outcomes reported by the checklist
use std::fmt;
use std::process::ExitCode;

/// Result category of a single run, mapped onto a fixed process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    AzureConfigNotFound,
    AzureConfigReadFailure,
    AzureConfigUnmarshalFailure,
    AzureCloudUnknown,
    ServicePrincipalCredentialInvalid,
    DnsResolutionFailure,
    MissingImagePullPermission,
}

impl ExitOutcome {
    /// Numeric process exit code
    pub fn code(self) -> u8 {
        match self {
            ExitOutcome::Success => 0,
            ExitOutcome::AzureConfigNotFound => 1,
            ExitOutcome::AzureConfigReadFailure => 2,
            ExitOutcome::AzureConfigUnmarshalFailure => 3,
            ExitOutcome::AzureCloudUnknown => 4,
            ExitOutcome::ServicePrincipalCredentialInvalid => 10,
            ExitOutcome::DnsResolutionFailure => 52,
            ExitOutcome::MissingImagePullPermission => 60,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitOutcome::Success => "success",
            ExitOutcome::AzureConfigNotFound => "azure config not found",
            ExitOutcome::AzureConfigReadFailure => "azure config read failure",
            ExitOutcome::AzureConfigUnmarshalFailure => "azure config unmarshal failure",
            ExitOutcome::AzureCloudUnknown => "unknown azure cloud",
            ExitOutcome::ServicePrincipalCredentialInvalid => "credential invalid",
            ExitOutcome::DnsResolutionFailure => "dns resolution failure",
            ExitOutcome::MissingImagePullPermission => "missing image pull permission",
        };
        f.write_str(name)
    }
}

impl From<ExitOutcome> for ExitCode {
    fn from(outcome: ExitOutcome) -> Self {
        ExitCode::from(outcome.code())
    }
}
