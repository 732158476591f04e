pub mod greedy;
pub mod repetition;
pub mod sampler;
pub mod selector;
pub mod temperature;
pub mod top_k;
pub mod top_p;

pub use greedy::{ArgMax, DistSampler, GreedySampler};
pub use repetition::RepetitionPenaltySampler;
pub use sampler::{Sampler, SamplerChain, TokenLogit};
pub use selector::TokenSelector;
pub use temperature::TemperatureSampler;
pub use top_k::TopKSampler;
pub use top_p::TopPSampler;
