// Template matching: identifier variants, candidate filenames, propeller map
pub mod candidates;
pub mod normalize;
pub mod propeller;
pub mod resolver;

pub use normalize::{build_variants, normalize, to_halfwidth, SOLD_OUT_MARKER};
pub use propeller::{PropellerCatalog, ProductCodeStore, PropellerHit, PropellerQuery};
pub use resolver::{Resolution, TemplateResolver};
