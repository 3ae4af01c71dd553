//! CLI commands

// Offline adapter commands
pub mod adapter;

// Repository management
pub mod repo;

// Artifact operations against a live repository
pub mod artifact;
pub mod index;
