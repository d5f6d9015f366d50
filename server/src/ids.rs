//! Wire-string conversions for the opaque id newtypes. The wire protocol
//! carries ids as strings (spec §6); `session`/`game-core` keep them as
//! small integers internally.

use session::{ClientId, PlayerId};

pub fn client_id_to_wire(id: ClientId) -> String {
    id.to_string()
}

pub fn player_id_to_wire(id: PlayerId) -> String {
    id.to_string()
}

pub fn parse_player_id(s: &str) -> Option<PlayerId> {
    s.strip_prefix('p')?.parse::<u64>().ok().map(PlayerId)
}

pub fn parse_client_id(s: &str) -> Option<ClientId> {
    s.strip_prefix('c')?.parse::<u64>().ok().map(ClientId)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_id_round_trips_through_its_wire_form() {
        let id = PlayerId(42);
        assert_eq!(parse_player_id(&player_id_to_wire(id)), Some(id));
    }

    #[test]
    fn malformed_wire_ids_are_rejected() {
        assert_eq!(parse_player_id("not-an-id"), None);
        assert_eq!(parse_client_id("p7"), None); // wrong prefix
    }
}
