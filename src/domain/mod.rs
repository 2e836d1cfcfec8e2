// Domain layer: billing entities, flat rows and the ports the export pipeline is built on.

pub mod model;
pub mod ports;
