//! Endpoint selection.
//!
//! Used both when addressing outbound requests and when deciding where an
//! inbound response must be delivered, so it has to be deterministic.

use tracing::debug;

use super::Endpoint;
use crate::types::Binding;

/// Picks the best endpoint from `candidates`.
///
/// Precedence:
///
/// 1. the endpoint whose index equals `preferred_index`;
/// 2. the first endpoint that is default and uses a preferred binding;
/// 3. the first default endpoint;
/// 4. the first endpoint using a preferred binding;
/// 5. the first endpoint of the list.
///
/// Returns `None` only for an empty list.
#[must_use]
pub fn select_endpoint<'a>(
    candidates: &'a [Endpoint],
    preferred_bindings: &[Binding],
    preferred_index: Option<u32>,
) -> Option<&'a Endpoint> {
    let preferred = |endpoint: &&Endpoint| preferred_bindings.contains(&endpoint.binding);

    let selected = preferred_index
        .and_then(|index| candidates.iter().find(|e| e.index == index))
        .or_else(|| {
            candidates
                .iter()
                .filter(|e| e.is_default)
                .find(preferred)
        })
        .or_else(|| candidates.iter().find(|e| e.is_default))
        .or_else(|| candidates.iter().find(preferred))
        .or_else(|| candidates.first());

    if let Some(endpoint) = selected {
        debug!(
            location = %endpoint.location,
            binding = ?endpoint.binding,
            index = endpoint.index,
            "selected endpoint"
        );
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acs_list() -> Vec<Endpoint> {
        vec![
            Endpoint::new("https://sp.example.com/acs/post", Binding::Post, 0).as_default(),
            Endpoint::new("https://sp.example.com/acs/redirect", Binding::Redirect, 1),
        ]
    }

    #[test]
    fn default_post_acs_without_index() {
        let list = acs_list();
        let selected = select_endpoint(&list, &[], None).unwrap();
        assert_eq!(selected.index, 0);
        assert_eq!(selected.binding, Binding::Post);
    }

    #[test]
    fn index_override_beats_default() {
        let list = acs_list();
        let selected = select_endpoint(&list, &[Binding::Post], Some(1)).unwrap();
        assert_eq!(selected.index, 1);
    }

    #[test]
    fn unknown_index_falls_through_to_default() {
        let list = acs_list();
        let selected = select_endpoint(&list, &[Binding::Redirect], Some(7)).unwrap();
        assert_eq!(selected.index, 0);
    }

    #[test]
    fn default_and_preferred_wins_regardless_of_order() {
        let mut list = vec![
            Endpoint::new("https://idp.example.com/sso/artifact", Binding::Artifact, 0)
                .as_default(),
            Endpoint::new("https://idp.example.com/sso/post", Binding::Post, 1),
            Endpoint::new("https://idp.example.com/sso/redirect", Binding::Redirect, 2)
                .as_default(),
        ];
        for _ in 0..list.len() {
            let selected = select_endpoint(&list, &[Binding::Redirect], None).unwrap();
            assert_eq!(selected.index, 2);
            list.rotate_left(1);
        }
    }

    #[test]
    fn first_default_when_no_binding_matches() {
        let list = vec![
            Endpoint::new("https://a", Binding::Artifact, 0),
            Endpoint::new("https://b", Binding::Soap, 1).as_default(),
            Endpoint::new("https://c", Binding::Soap, 2).as_default(),
        ];
        assert_eq!(select_endpoint(&list, &[Binding::Post], None).unwrap().index, 1);
    }

    #[test]
    fn preferred_binding_without_defaults() {
        let list = vec![
            Endpoint::new("https://a", Binding::Post, 0),
            Endpoint::new("https://b", Binding::Redirect, 1),
        ];
        assert_eq!(select_endpoint(&list, &[Binding::Redirect], None).unwrap().index, 1);
    }

    #[test]
    fn first_entry_is_last_resort() {
        let list = vec![
            Endpoint::new("https://a", Binding::Artifact, 3),
            Endpoint::new("https://b", Binding::Soap, 4),
        ];
        assert_eq!(select_endpoint(&list, &[Binding::Post], None).unwrap().index, 3);
        assert!(select_endpoint(&[], &[Binding::Post], Some(0)).is_none());
    }
}
