// UI module - GUI logic and event loop bridge
//
// - EventLoopBridge: Coordinates between tokio async runtime and Slint event loop
// - GuiController: Wires the Slint window to session state and the flows

pub mod bridge;
pub mod controller;

pub use bridge::{EventLoopBridge, EventLoopBridgeHandle};
pub use controller::GuiController;
