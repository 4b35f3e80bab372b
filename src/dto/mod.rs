pub mod session_dto;
pub mod test_dto;
