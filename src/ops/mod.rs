//! The reference operator set.
//!
//! Sources, transforms and sinks built on the subscription, observer,
//! strand and pipeline layers. One operator per file:
//!
//! - sources: [`ints`], [`intervals`]
//! - stateless transforms: [`filter`], [`map`]
//! - stateful transforms: [`take`], [`last_or_default`], [`finalize`]
//! - context switchers: [`observe_on`], [`delay`]
//! - the concurrent combinator: [`merge`] (and the [`merge_map`] fusion)
//! - sinks: [`printto`], [`collect_into`], [`consume`]

mod collect;
mod delay;
mod filter;
mod finalize;
mod ints;
mod intervals;
mod last_or_default;
mod map;
mod merge;
mod observe_on;
mod printto;
mod take;

pub use collect::{collect_into, consume, CollectInto, Consume};
pub use delay::{delay, Delay};
pub use filter::{filter, Filter};
pub use finalize::{finalize, Finalize};
pub use ints::{ints, Ints};
pub use intervals::{intervals, Intervals};
pub use last_or_default::{last_or_default, LastOrDefault};
pub use map::{map, Map};
pub use merge::{merge, merge_map, Merge};
pub use observe_on::{observe_on, ObserveOn};
pub use printto::{printto, printto_shared, PrintTo};
pub use take::{take, Take};
