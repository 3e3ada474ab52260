//! Shared test code.

pub(crate) mod writer {
    //! Builders for hand-assembled table data.
    #![allow(dead_code)]

    /// A value in one of the big-endian encodings used by font tables.
    #[derive(Clone, Copy, Debug)]
    pub enum TtfType {
        UInt8(u8),
        Int16(i16),
        UInt16(u16),
        UInt24(u32),
        UInt32(u32),
    }

    impl TtfType {
        fn write_to(self, data: &mut Vec<u8>) {
            match self {
                TtfType::UInt8(n) => data.push(n),
                TtfType::Int16(n) => data.extend_from_slice(&n.to_be_bytes()),
                TtfType::UInt16(n) => data.extend_from_slice(&n.to_be_bytes()),
                TtfType::UInt24(n) => data.extend_from_slice(&n.to_be_bytes()[1..]),
                TtfType::UInt32(n) => data.extend_from_slice(&n.to_be_bytes()),
            }
        }
    }

    pub fn convert(values: &[TtfType]) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_all(values);
        w.data
    }

    #[derive(Debug)]
    pub struct Writer {
        pub data: Vec<u8>,
    }

    impl Writer {
        pub fn new() -> Self {
            Writer {
                data: Vec::with_capacity(256),
            }
        }

        pub fn offset(&self) -> usize {
            self.data.len()
        }

        pub fn write(&mut self, value: TtfType) {
            value.write_to(&mut self.data);
        }

        pub fn write_all(&mut self, values: &[TtfType]) {
            for value in values {
                self.write(*value);
            }
        }

        pub fn u16s(&mut self, values: &[u16]) {
            for value in values {
                self.write(TtfType::UInt16(*value));
            }
        }

        pub fn zeros(&mut self, count: usize) {
            self.data.resize(self.data.len() + count, 0);
        }

        /// Reserve a u16 slot to be filled in later with `patch_u16`.
        pub fn placeholder_u16(&mut self) -> usize {
            let offset = self.offset();
            self.write(TtfType::UInt16(0));
            offset
        }

        pub fn patch_u16(&mut self, at: usize, value: u16) {
            self.data[at..at + 2].copy_from_slice(&value.to_be_bytes());
        }

        pub fn patch_u32(&mut self, at: usize, value: u32) {
            self.data[at..at + 4].copy_from_slice(&value.to_be_bytes());
        }

        /// Patch the slot at `at` with the offset from `base` to the current position.
        pub fn patch_offset16(&mut self, at: usize, base: usize) {
            let value = (self.offset() - base) as u16;
            self.patch_u16(at, value);
        }
    }
}
