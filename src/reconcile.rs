use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One entry of the backend's services contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn enabled_by_default() -> bool {
    true
}

impl Service {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            category: None,
            enabled: true,
            extra: serde_json::Map::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "service_id", rename_all = "snake_case")]
pub enum ReconcileAction {
    AddService(String),
    RemoveService(String),
}

impl ReconcileAction {
    pub fn service_id(&self) -> &str {
        match self {
            ReconcileAction::AddService(id) | ReconcileAction::RemoveService(id) => id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileResponse {
    #[serde(default)]
    pub deployable_services: Vec<Service>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Applies the toggle locally before the backend answers.
pub fn optimistic_toggle(local: &[Service], action: &ReconcileAction) -> Vec<Service> {
    match action {
        ReconcileAction::AddService(id) => {
            let mut next = dedup(local.iter().cloned());
            if !next.iter().any(|service| service.id == *id) {
                next.push(Service::new(id.clone()));
            }
            next
        }
        ReconcileAction::RemoveService(id) => {
            dedup(local.iter().filter(|service| service.id != *id).cloned())
        }
    }
}

/// Merges the contract returned by a reconcile call into local state.
///
/// The result only ever contains ids from `local` plus the added service,
/// without duplicates and in local order. Local entries the backend did not
/// echo back are kept as they were, and the removed service is gone even if
/// the backend still lists it.
pub fn apply_reconcile(
    local: &[Service],
    action: &ReconcileAction,
    response: &ReconcileResponse,
) -> Vec<Service> {
    let toggled = action.service_id();
    let remote = |id: &str| {
        response
            .deployable_services
            .iter()
            .find(|service| service.id == id)
    };

    let mut merged: Vec<Service> = Vec::with_capacity(local.len() + 1);
    let mut seen: HashSet<&str> = HashSet::new();

    for service in local {
        if !seen.insert(service.id.as_str()) {
            continue;
        }
        if matches!(action, ReconcileAction::RemoveService(_)) && service.id == toggled {
            continue;
        }
        merged.push(remote(&service.id).cloned().unwrap_or_else(|| service.clone()));
    }

    if let ReconcileAction::AddService(id) = action {
        if !seen.contains(id.as_str()) {
            merged.push(remote(id).cloned().unwrap_or_else(|| Service::new(id.clone())));
        }
    }

    let ignored = response
        .deployable_services
        .iter()
        .filter(|service| !merged.iter().any(|kept| kept.id == service.id))
        .count();
    if ignored > 0 {
        log::warn!(ignored; "reconcile response listed services outside the local contract");
    }

    merged
}

fn dedup(services: impl Iterator<Item = Service>) -> Vec<Service> {
    let mut seen = HashSet::new();
    services
        .filter(|service| seen.insert(service.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(services: &[Service]) -> Vec<&str> {
        services.iter().map(|service| service.id.as_str()).collect()
    }

    fn local() -> Vec<Service> {
        vec![Service::new("api"), Service::new("db"), Service::new("cache")]
    }

    #[test]
    fn add_appends_once() {
        let action = ReconcileAction::AddService("cdn".into());
        let mut cdn = Service::new("cdn");
        cdn.name = Some("CloudFront".into());
        let response = ReconcileResponse {
            deployable_services: vec![
                Service::new("api"),
                cdn.clone(),
                cdn,
                Service::new("surprise"),
            ],
            message: None,
        };

        let merged = apply_reconcile(&local(), &action, &response);
        assert_eq!(ids(&merged), ["api", "db", "cache", "cdn"]);
        assert_eq!(merged[3].display_name(), "CloudFront");
    }

    #[test]
    fn remove_drops_only_the_toggled_service() {
        let action = ReconcileAction::RemoveService("db".into());
        let response = ReconcileResponse {
            deployable_services: vec![Service::new("api"), Service::new("db")],
            message: None,
        };

        let merged = apply_reconcile(&local(), &action, &response);
        assert_eq!(ids(&merged), ["api", "cache"]);
    }

    #[test]
    fn ids_stay_within_original_plus_toggled() {
        let mut with_duplicates = local();
        with_duplicates.push(Service::new("api"));

        for action in [
            ReconcileAction::AddService("queue".into()),
            ReconcileAction::AddService("db".into()),
            ReconcileAction::RemoveService("cache".into()),
            ReconcileAction::RemoveService("unknown".into()),
        ] {
            let merged = apply_reconcile(&with_duplicates, &action, &ReconcileResponse::default());
            let merged_ids: HashSet<&str> = ids(&merged).into_iter().collect();
            assert_eq!(merged_ids.len(), merged.len(), "duplicates after {action:?}");

            let mut allowed: HashSet<&str> = ids(&with_duplicates).into_iter().collect();
            match &action {
                ReconcileAction::AddService(id) => {
                    allowed.insert(id);
                }
                ReconcileAction::RemoveService(id) => {
                    allowed.remove(id.as_str());
                }
            }
            assert_eq!(merged_ids, allowed, "after {action:?}");
        }
    }

    #[test]
    fn optimistic_toggle_matches_reconcile_shape() {
        let added = optimistic_toggle(&local(), &ReconcileAction::AddService("cdn".into()));
        assert_eq!(ids(&added), ["api", "db", "cache", "cdn"]);

        let removed = optimistic_toggle(&added, &ReconcileAction::RemoveService("api".into()));
        assert_eq!(ids(&removed), ["db", "cache", "cdn"]);
    }

    #[test]
    fn action_serializes_for_the_backend() {
        let json = serde_json::to_value(ReconcileAction::AddService("cdn".into())).unwrap();
        assert_eq!(json, serde_json::json!({"action": "add_service", "service_id": "cdn"}));
    }
}
