use crate::{RequestMessage, ResponseMessage};

#[test]
fn size() {
    // RequestMessage/ResponseMessage are enums dispatching over every service message type,
    // each variant a boxed request/response. Keep the enum itself pointer-sized regardless of
    // how many services get added.
    use std::mem;
    let size = mem::size_of::<ResponseMessage>();
    println!("ResponseMessage size = {}", size);
    assert!(size <= mem::size_of::<usize>() * 2);

    let size = mem::size_of::<RequestMessage>();
    println!("RequestMessage size = {}", size);
    assert!(size <= mem::size_of::<usize>() * 2);
}
