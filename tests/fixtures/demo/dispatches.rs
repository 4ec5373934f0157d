#[pallet::call]
impl<T: Config> Pallet<T> {
    #[pallet::call_index(0)]
    #[pallet::weight((Weight::from_parts(1_000_000_000, 0)
        .saturating_add(T::DbWeight::get().reads(2))
        .saturating_add(T::DbWeight::get().writes(1)), DispatchClass::Normal, Pays::No))]
    pub fn do_thing(origin: OriginFor<T>) -> DispatchResult {
        ensure_signed(origin)?;
        Ok(())
    }

    #[pallet::call_index(1)]
    #[pallet::weight(Weight::from_parts(25_000_000, 0)
        .saturating_add(T::DbWeight::get().reads_writes(1, 1)))]
    pub fn steady(origin: OriginFor<T>) -> DispatchResult {
        ensure_signed(origin)?;
        Ok(())
    }
}
