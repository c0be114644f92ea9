use crate::responses::HealthRes;

/// Simple health service shared by the REST API and tooling.
#[derive(Clone, Debug, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Returns a healthy status. Preferred over instantiating the service.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "hatch is alive".into(),
        }
    }
}
