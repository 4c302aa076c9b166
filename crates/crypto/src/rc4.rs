/// RC4 stream cipher, needed for the `TLS_RSA_WITH_RC4_128_*` suites (§4.4).
/// Encryption and decryption are the same XOR-with-keystream operation.

pub struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    /// Key-scheduling algorithm (KSA). Key length must be 1..=256 bytes.
    pub fn new(key: &[u8]) -> Result<Self, &'static str> {
        if key.is_empty() || key.len() > 256 {
            return Err("RC4 key must be between 1 and 256 bytes");
        }
        let mut s = [0u8; 256];
        for (i, slot) in s.iter_mut().enumerate() {
            *slot = i as u8;
        }
        let mut j = 0u8;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }
        Ok(Self { s, i: 0, j: 0 })
    }

    /// Pseudo-random generation algorithm (PRGA), XORed in place over `data`.
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let k = self.s[(self.s[self.i as usize].wrapping_add(self.s[self.j as usize])) as usize];
            *byte ^= k;
        }
    }
}
