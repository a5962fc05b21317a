//! Audio controller drivers for the bus bridge.
//!
//! | Profile            | Kind            | Attached to      | Binds         |
//! |--------------------|-----------------|------------------|---------------|
//! | [`PowerProfile`]     | `audio.power`   | controllers      | `[c,0,0,7]`   |
//! | [`VolumeProfile`]    | `audio.volume`  | zones            | `[c,z,0,3]`   |
//! | [`ParameterProfile`] | `bus.parameter` | every object     | `[c,z,g,*]`   |

mod body;
pub mod bridge;
pub mod compose;
pub mod error;
pub mod parameter;
pub mod power;
pub mod volume;

pub use bridge::{Bridge, ObjectSummary, ProfileSummary};
pub use compose::{compose, Composition};
pub use error::{DriverError, DriverResult};
pub use parameter::{ParameterProcessor, ParameterProfile};
pub use power::{PowerProcessor, PowerProfile, PowerState, POWER_PARAMETER};
pub use volume::{VolumeProcessor, VolumeProfile, MAX_VOLUME, VOLUME_PARAMETER};
