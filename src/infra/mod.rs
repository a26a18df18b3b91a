pub mod db;
pub mod remote;
