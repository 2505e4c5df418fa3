pub mod handoff;

pub use handoff::{
    ClientContext, HandoffStore, RegisterDraft, SharedHandoffStore, VerifierContext,
};
