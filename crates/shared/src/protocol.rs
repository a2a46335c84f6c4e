use crate::domain::UserId;

pub const USERS_PATH: &str = "/user-information";

pub fn user_path(id: &UserId) -> String {
    let mut path = format!("{USERS_PATH}/");
    for byte in id.as_str().bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                path.push(char::from(byte))
            }
            _ => path.push_str(&format!("%{byte:02X}")),
        }
    }
    path
}
