use crate::domain::participant::Participant;

/// Computes the ordered list of participants that should receive the next
/// turn.
///
/// The result is a rotation of the original seating order: every
/// participant seated after the local player comes first, then the
/// participants seated before them, and the local player closes the list
/// so the turn is only re-offered to them once nobody else is left. Seats
/// in terminal `Done` status are excluded entirely.
///
/// The service should never hand out two seats with the same display name;
/// if it does anyway, the first match in scan order is treated as the
/// local seat.
pub fn next_players(participants: &[Participant], local_display_name: &str) -> Vec<Participant> {
    let mut before = Vec::new();
    let mut after = Vec::new();
    let mut current = None;

    for participant in participants.iter().filter(|p| p.in_rotation()) {
        if current.is_some() {
            after.push(participant.clone());
        } else if participant.display_name == local_display_name {
            current = Some(participant.clone());
        } else {
            before.push(participant.clone());
        }
    }

    let mut rotation = after;
    rotation.append(&mut before);
    if let Some(local) = current {
        rotation.push(local);
    }

    rotation
}
