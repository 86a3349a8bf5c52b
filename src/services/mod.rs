// Flows: each public function is one user action, composed from independent
// store and storage calls.
pub mod comments;
pub mod posts;
pub mod profiles;
pub mod tags;
