//! CrudService: deadline-bounded CRUD over the adapter registry, plus body validation.

mod crud;
mod validation;
pub use crud::CrudService;
pub use validation::RequestValidator;
