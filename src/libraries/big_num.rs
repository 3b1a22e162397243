///! 128, 256 and 512 bit unsigned integers.
///! U512 exists only as the phantom-overflow intermediate for U256 mul/div.
use uint::construct_uint;

construct_uint! {
    pub struct U128(2);
}

construct_uint! {
    pub struct U256(4);
}

construct_uint! {
    pub struct U512(8);
}
