pub mod oauth;
pub mod status;
pub mod submit;
