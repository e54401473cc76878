pub mod file_names;
