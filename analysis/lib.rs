#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod config;
pub mod data;
pub mod estimate;
pub mod evaluate;
pub mod features;
pub mod lasso;
pub mod model;
pub mod pipeline;
pub mod pirls;
