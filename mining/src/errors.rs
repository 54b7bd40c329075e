pub use pool_mining_errors::{
    share::ShareRejection,
    store::{StoreError, StoreResult},
    template::{TemplateError, TemplateResult},
};
