//! Listeners notified after each packet is dissected.

use crate::context::PacketContext;
use crate::field::FieldTree;

/// Receives every completed packet.
///
/// Both arguments are borrowed for the duration of the call. A tap that
/// wants to keep bytes must copy them out (e.g. with [`View::to_bytes`]).
///
/// [`View::to_bytes`]: crate::tvb::View::to_bytes
pub trait Tap: Send {
    fn packet(&mut self, context: &PacketContext, tree: &FieldTree);
}

impl<F> Tap for F
where
    F: FnMut(&PacketContext, &FieldTree) + Send,
{
    fn packet(&mut self, context: &PacketContext, tree: &FieldTree) {
        self(context, tree)
    }
}
