/// Compile time assertion, similar to a `static_assert` from c++
macro_rules! const_assert {
    ($cond:expr $(,)?) => {
        const _: () = {
            if !$cond {
                panic!(concat!("const assertion failed: ", stringify!($cond)));
            }
        };
    };
    ($cond:expr, $($arg:tt)+) => {
        const _: () = {
            if !$cond {
                panic!($($arg)+);
            }
        };
    };
}

/// Returns the last OS error (errno) converted into a `DirStreamError`
macro_rules! return_os_error {
    () => {{
        return Err(std::io::Error::last_os_error().into());
    }};
}

/// Reads a native-endian integer of type `$t` at `$offset` out of a byte slice.
///
/// Evaluates to `None` if the slice is too short, never reads out of bounds.
macro_rules! read_ne {
    ($bytes:expr, $offset:expr, $t:ty) => {{
        const WIDTH: usize = core::mem::size_of::<$t>();
        let start: usize = $offset;
        $bytes
            .get(start..start + WIDTH)
            .and_then(|field: &[u8]| <[u8; WIDTH]>::try_from(field).ok())
            .map(<$t>::from_ne_bytes)
    }};
}
